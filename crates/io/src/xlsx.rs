// Excel / OpenDocument import and XLSX export
//
// Import reads the first worksheet only; every value becomes display text.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use promptgrid_engine::Table;
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use crate::{table_from_records, IoError};

pub const EXPORT_SHEET_NAME: &str = "Sheet1";

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) if ts.hour() == 0 && ts.minute() == 0 && ts.second() == 0 => {
                ts.format("%Y-%m-%d").to_string()
            }
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Import the first sheet of an xlsx/xls/xlsb/ods file
pub fn import(path: &Path, has_headers: bool) -> Result<Table, IoError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| IoError::Spreadsheet(format!("failed to open {}: {}", path.display(), e)))?;

    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Err(IoError::Spreadsheet("workbook contains no sheets".into()));
    };

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| IoError::Spreadsheet(format!("failed to read sheet '{}': {}", first, e)))?;

    let records: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok(table_from_records(records, has_headers))
}

pub fn export(table: &Table, path: &Path) -> Result<(), IoError> {
    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook
        .add_worksheet()
        .set_name(EXPORT_SHEET_NAME)
        .map_err(|e| IoError::Spreadsheet(e.to_string()))?;

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(|e| IoError::Spreadsheet(e.to_string()))?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string((row_idx + 1) as u32, col as u16, value)
                .map_err(|e| IoError::Spreadsheet(e.to_string()))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| IoError::Spreadsheet(format!("failed to save {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_xlsx_export_and_reimport() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let table = Table::new(
            vec!["Name".into(), "Summary".into()],
            vec![
                vec!["Alice".into(), "likes Rust".into()],
                vec!["Bob".into(), String::new()],
            ],
        );

        export(&table, &path).unwrap();
        let imported = import(&path, true).unwrap();
        assert_eq!(imported, table);
    }

    #[test]
    fn test_cell_text_numbers() {
        assert_eq!(cell_text(&Data::Float(42.0)), "42");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            import(&dir.path().join("nope.xlsx"), true),
            Err(IoError::Spreadsheet(_))
        ));
    }
}
