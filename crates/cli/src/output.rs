// Filter parsing and table printing shared by `run` and `filter`

use std::io::{self, Write};
use std::path::Path;

use promptgrid_engine::filter::Filter;
use promptgrid_engine::{Spreadsheet, Table};

use crate::CliError;

/// Parse filter expressions and check each targets an existing column
pub fn parse_filters(exprs: &[String], column_count: usize) -> Result<Vec<Filter>, CliError> {
    exprs
        .iter()
        .map(|expr| {
            let filter = Filter::parse_expr(expr)?;
            if filter.column_index >= column_count {
                return Err(CliError::args(format!(
                    "filter '{}' targets column {}, but the file has {} column(s)",
                    expr, filter.column_index, column_count
                ))
                .with_hint("filter columns are 0-based"));
            }
            Ok(filter)
        })
        .collect()
}

/// Write a table to stdout as CSV, or as an array of objects
pub fn print_table(table: &Table, json: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let value = promptgrid_io::json::to_value(table);
        serde_json::to_writer_pretty(&mut out, &value)
            .map_err(|e| CliError::io(format!("failed to write JSON: {}", e)))?;
        writeln!(out).map_err(|e| CliError::io(e.to_string()))?;
    } else {
        promptgrid_io::csv::write_table(table, &mut out, b',')
            .map_err(|e| CliError::io(format!("failed to write CSV: {}", e)))?;
    }
    Ok(())
}

pub fn cmd_filter(file: &Path, exprs: &[String], json: bool, no_headers: bool) -> Result<(), CliError> {
    let table = promptgrid_io::import(file, !no_headers)?;
    let mut sheet = Spreadsheet::from_table(&table)?;
    for filter in parse_filters(exprs, sheet.column_count())? {
        sheet.add_filter(filter)?;
    }

    let filtered = sheet.export_filtered();
    log::info!(
        "{} of {} row(s) pass {} filter(s)",
        filtered.rows.len(),
        sheet.row_count(),
        sheet.filters().len()
    );
    print_table(&filtered, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::{EXIT_PARSE, EXIT_USAGE};

    #[test]
    fn parse_filters_accepts_valid_expressions() {
        let exprs = vec!["0:text:contains:a".to_string(), "1:number:between:1..5".to_string()];
        let filters = parse_filters(&exprs, 2).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].value2.as_deref(), Some("5"));
    }

    #[test]
    fn parse_filters_rejects_out_of_range_column() {
        let err = parse_filters(&["2:text:empty".to_string()], 2).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }

    #[test]
    fn parse_filters_rejects_bad_syntax() {
        let err = parse_filters(&["name=bob".to_string()], 2).unwrap_err();
        assert_eq!(err.code, EXIT_PARSE);
    }
}
