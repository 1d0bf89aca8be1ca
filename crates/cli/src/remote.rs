// `pgrid fetch` and `pgrid push`: tables from and to REST endpoints

use std::path::Path;

use promptgrid_engine::Spreadsheet;
use promptgrid_io::api::{self, ApiExportConfig, ApiImportConfig};

use crate::output::{parse_filters, print_table};
use crate::{block_on, CliError};

pub fn cmd_fetch(config_path: &Path, output: Option<&Path>, json: bool) -> Result<(), CliError> {
    let config = ApiImportConfig::load(config_path)?;
    let table = block_on(api::fetch_table(&config))??;
    log::info!("Fetched {} row(s) from {}", table.rows.len(), config.url);

    match output {
        Some(path) => {
            promptgrid_io::export(&table, path)?;
            eprintln!("Wrote {} row(s) to {}", table.rows.len(), path.display());
            Ok(())
        }
        None => print_table(&table, json),
    }
}

/// Send the rows that pass every filter (all rows without filters)
pub fn cmd_push(file: &Path, config_path: &Path, filters: &[String], no_headers: bool) -> Result<(), CliError> {
    let config = ApiExportConfig::load(config_path)?;
    let table = promptgrid_io::import(file, !no_headers)?;
    let mut sheet = Spreadsheet::from_table(&table)?;
    for filter in parse_filters(filters, sheet.column_count())? {
        sheet.add_filter(filter)?;
    }

    let rows = sheet.export_filtered();
    block_on(api::push_table(&rows, &config))??;
    eprintln!("Sent {} row(s) to {}", rows.rows.len(), config.url);
    Ok(())
}
