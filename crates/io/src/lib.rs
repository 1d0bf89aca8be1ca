// File I/O operations
//
// Every adapter produces or consumes a `Table`; the engine never sees a file
// format or a wire payload.

use std::path::{Path, PathBuf};

use promptgrid_engine::cell::default_column_name;
use promptgrid_engine::Table;
use thiserror::Error;

pub mod api;
pub mod csv;
pub mod json;
pub mod xlsx;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{path}: {source}")]
    File { path: PathBuf, source: std::io::Error },
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("unsupported JSON layout: {0}")]
    Layout(String),
    #[error("unsupported file format: {0}")]
    Unsupported(String),
    #[error("API request failed: {0}")]
    Api(String),
}

impl IoError {
    pub(crate) fn file(path: &Path, source: std::io::Error) -> Self {
        IoError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    /// xlsx for export; xlsx, xls, xlsb or ods for import
    Excel,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(FileFormat::Csv),
            "tsv" | "tab" => Ok(FileFormat::Tsv),
            "json" => Ok(FileFormat::Json),
            "xlsx" | "xls" | "xlsb" | "ods" => Ok(FileFormat::Excel),
            _ => Err(IoError::Unsupported(path.display().to_string())),
        }
    }
}

/// Import any supported file by extension
pub fn import(path: &Path, has_headers: bool) -> Result<Table, IoError> {
    let table = match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::import(path, has_headers)?,
        FileFormat::Tsv => csv::import_with_delimiter(path, b'\t', has_headers)?,
        FileFormat::Json => json::import(path, has_headers)?,
        FileFormat::Excel => xlsx::import(path, has_headers)?,
    };
    log::debug!(
        "Imported {} ({} columns, {} rows)",
        path.display(),
        table.width(),
        table.rows.len()
    );
    Ok(table)
}

/// Export to any supported file by extension
pub fn export(table: &Table, path: &Path) -> Result<(), IoError> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::export(table, path),
        FileFormat::Tsv => csv::export_tsv(table, path),
        FileFormat::Json => json::export(table, path),
        FileFormat::Excel => {
            let is_xlsx = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
            if !is_xlsx {
                return Err(IoError::Unsupported(format!(
                    "{} (Excel export writes .xlsx only)",
                    path.display()
                )));
            }
            xlsx::export(table, path)
        }
    }
}

/// Shape raw records into a cleaned table. Headers are widened with default
/// names so no data column is dropped.
pub(crate) fn table_from_records(records: Vec<Vec<String>>, has_headers: bool) -> Table {
    let mut table = if has_headers {
        Table::with_header_row(records)
    } else {
        Table::from_rows(records)
    };

    let width = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    while table.headers.len() < width {
        let position = table.headers.len() + 1;
        table.headers.push(default_column_name(position));
    }

    table.cleaned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.CSV")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path(Path::new("a.tsv")).unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path(Path::new("a.ods")).unwrap(), FileFormat::Excel);
        assert!(matches!(
            FileFormat::from_path(Path::new("a.pdf")),
            Err(IoError::Unsupported(_))
        ));
    }

    #[test]
    fn test_records_wider_than_headers() {
        let table = table_from_records(vec![s(&["Name"]), s(&[" Ann ", "extra"]), s(&["", ""])], true);
        assert_eq!(table.headers, s(&["Name", "Column 2"]));
        assert_eq!(table.rows, vec![s(&["Ann", "extra"])]);
    }

    #[test]
    fn test_records_without_headers() {
        let table = table_from_records(vec![s(&["a", "b"]), s(&["c"])], false);
        assert_eq!(table.headers, s(&["Column 1", "Column 2"]));
        assert_eq!(table.rows.len(), 2);
    }
}
