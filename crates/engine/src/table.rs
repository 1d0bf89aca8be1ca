//! Plain string table exchanged with import/export adapters.
//!
//! File and API adapters never see `Cell` or `Column`; they hand the engine a
//! `Table` and receive one back from `Document::to_table`.

use serde::{Deserialize, Serialize};

use crate::cell::default_column_name;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Build a table from headerless data, naming columns `Column 1..n`
    /// after the widest row.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let headers = (1..=width).map(default_column_name).collect();
        Self { headers, rows }
    }

    /// Split the first row off as headers
    pub fn with_header_row(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let headers = rows.remove(0);
        Self { headers, rows }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Trim every cell and drop rows that are entirely empty.
    pub fn cleaned(mut self) -> Self {
        for header in &mut self.headers {
            let trimmed = header.trim();
            if trimmed.len() != header.len() {
                *header = trimmed.to_string();
            }
        }
        self.rows = self
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.trim().to_string()).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .collect();
        self
    }

    /// Keep only the rows at the given indices, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}
