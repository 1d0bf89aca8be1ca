// JSON import/export
//
// Export writes an array of header-keyed objects. Import accepts that shape
// or an array of arrays.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use promptgrid_engine::Table;
use serde_json::{Map, Value};

use crate::{table_from_records, IoError};

/// Header names made unique so no column is lost to a key collision
fn object_keys(headers: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut key = header.clone();
        let mut n = 2;
        while keys.contains(&key) {
            key = format!("{} ({})", header, n);
            n += 1;
        }
        keys.push(key);
    }
    keys
}

/// The table as an array of header-keyed objects
pub fn to_value(table: &Table) -> Value {
    let keys = object_keys(&table.headers);
    let objects = table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (i, key) in keys.iter().enumerate() {
                let value = row.get(i).cloned().unwrap_or_default();
                object.insert(key.clone(), Value::String(value));
            }
            Value::Object(object)
        })
        .collect();
    Value::Array(objects)
}

pub fn export(table: &Table, path: &Path) -> Result<(), IoError> {
    let file = File::create(path).map_err(|e| IoError::file(path, e))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &to_value(table))?;
    Ok(())
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Import an array of objects (headers from keys in first-seen order) or an
/// array of arrays (`has_headers` applies to this shape only).
pub fn import(path: &Path, has_headers: bool) -> Result<Table, IoError> {
    let file = File::open(path).map_err(|e| IoError::file(path, e))?;
    let value: Value = serde_json::from_reader(std::io::BufReader::new(file))?;
    import_value(&value, has_headers)
}

pub fn import_value(value: &Value, has_headers: bool) -> Result<Table, IoError> {
    let Value::Array(items) = value else {
        return Err(IoError::Layout("expected a top-level array".into()));
    };

    match items.first() {
        None => Ok(Table::default()),
        Some(Value::Object(_)) => {
            let mut headers: Vec<String> = Vec::new();
            for item in items {
                let Value::Object(object) = item else {
                    return Err(IoError::Layout("mixed objects and non-objects".into()));
                };
                for key in object.keys() {
                    if !headers.contains(key) {
                        headers.push(key.clone());
                    }
                }
            }

            let mut records = vec![headers.clone()];
            for item in items {
                if let Value::Object(object) = item {
                    records.push(
                        headers
                            .iter()
                            .map(|h| object.get(h).map(scalar_to_string).unwrap_or_default())
                            .collect(),
                    );
                }
            }
            Ok(table_from_records(records, true))
        }
        Some(Value::Array(_)) => {
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let Value::Array(cells) = item else {
                    return Err(IoError::Layout("mixed arrays and non-arrays".into()));
                };
                records.push(cells.iter().map(scalar_to_string).collect());
            }
            Ok(table_from_records(records, has_headers))
        }
        Some(_) => Err(IoError::Layout("expected objects or arrays".into())),
    }
}
