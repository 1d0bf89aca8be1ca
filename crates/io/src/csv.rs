// CSV/TSV import/export

use std::io::{Read, Write};
use std::path::Path;

use promptgrid_engine::Table;

use crate::{table_from_records, IoError};

pub fn import(path: &Path, has_headers: bool) -> Result<Table, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_str(&content, delimiter, has_headers)
}

pub fn import_with_delimiter(path: &Path, delimiter: u8, has_headers: bool) -> Result<Table, IoError> {
    let content = read_file_as_utf8(path)?;
    import_from_str(&content, delimiter, has_headers)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must split the first line to be viable
        let target = counts[0];
        if target <= 1 {
            continue;
        }

        // Lines agreeing with line 1, weighted by field count
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let mut file = std::fs::File::open(path).map_err(|e| IoError::file(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| IoError::file(path, e))?;

    // Strip a UTF-8 BOM (Excel adds one)
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        bytes.drain(..3);
    }

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

pub fn import_from_str(content: &str, delimiter: u8, has_headers: bool) -> Result<Table, IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(table_from_records(records, has_headers))
}

pub fn export(table: &Table, path: &Path) -> Result<(), IoError> {
    export_with_delimiter(table, path, b',')
}

pub fn export_tsv(table: &Table, path: &Path) -> Result<(), IoError> {
    export_with_delimiter(table, path, b'\t')
}

fn export_with_delimiter(table: &Table, path: &Path, delimiter: u8) -> Result<(), IoError> {
    let file = std::fs::File::create(path).map_err(|e| IoError::file(path, e))?;
    write_table(table, std::io::BufWriter::new(file), delimiter)
}

/// Write the header row and every data row to any writer
pub fn write_table<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer);

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }

    writer.flush().map_err(|e| IoError::Csv(e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Age,City\nAlice,30,Paris\nBob,25,London\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAge\tCity\nAlice\t30\tParis\nBob\t25\tLondon\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let content = "Name|Age|City\nAlice|30|Paris\nBob|25|London\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Address;City\n\"Doe, Jane\";\"123 Main St, Apt 4\";Paris\nBob;\"456 Elm\";London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_single_column_defaults_to_comma() {
        assert_eq!(sniff_delimiter("Name\nAlice\nBob\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_semicolon_csv_import_with_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.csv");
        fs::write(&path, "Name;Age;City\n Alice ;30;Paris\n;;\nBob;25;London\n").unwrap();

        let table = import(&path, true).unwrap();
        assert_eq!(table.headers, vec!["Name", "Age", "City"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Alice", "30", "Paris"]);
        assert_eq!(table.rows[1], vec!["Bob", "25", "London"]);
    }

    #[test]
    fn test_import_without_headers() {
        let table = import_from_str("a,b\nc,d\n", b',', false).unwrap();
        assert_eq!(table.headers, vec!["Column 1", "Column 2"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Café" in Windows-1252
        fs::write(&path, b"Name\nCaf\xe9\n").unwrap();

        let table = import(&path, true).unwrap();
        assert_eq!(table.rows[0][0], "Café");
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        fs::write(&path, b"\xEF\xBB\xBFName,Age\nAnn,3\n").unwrap();

        let table = import(&path, true).unwrap();
        assert_eq!(table.headers[0], "Name");
    }

    #[test]
    fn test_write_table_quotes_fields() {
        let table = Table::new(
            vec!["Name".into(), "Note".into()],
            vec![vec!["Ann".into(), "a, b".into()]],
        );
        let mut out = Vec::new();
        write_table(&table, &mut out, b',').unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Name,Note\nAnn,\"a, b\"\n");
    }

    #[test]
    fn test_tsv_export_and_reimport() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tsv");
        let table = Table::new(
            vec!["Name".into(), "Note".into()],
            vec![
                vec!["Alice".into(), "likes, commas".into()],
                vec!["Bob".into(), "17".into()],
            ],
        );

        export_tsv(&table, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Name\tNote\n"));

        let imported = import_with_delimiter(&path, b'\t', true).unwrap();
        assert_eq!(imported, table);
    }
}
