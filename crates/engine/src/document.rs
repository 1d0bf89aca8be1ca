//! The in-memory grid.
//!
//! A `Document` is a persistent value: every mutation returns a new
//! `Document` and leaves `self` untouched. Rows are shared through `Arc`, so
//! a snapshot that differs by one cell costs one row copy plus a vector of
//! reference bumps.
//!
//! Invariants (enforced here, not by callers):
//! - at least one row and one column
//! - every row is exactly `columns.len()` cells wide
//! - every row carries a `RowId`, unique within the document

use std::sync::Arc;

use thiserror::Error;

use crate::cell::{Cell, Column, ColumnId, RowId};
use crate::table::Table;

/// Rows in a fresh session document
pub const INITIAL_ROWS: usize = 5;
/// Columns in a fresh session document
pub const INITIAL_COLS: usize = 3;

pub type Row = Arc<[Cell]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("row {row} is out of range (document has {rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("column {col} is out of range (document has {cols} columns)")]
    ColumnOutOfRange { col: usize, cols: usize },
    #[error("column width must be greater than zero")]
    InvalidWidth,
    #[error("imported table has no columns")]
    NoColumns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    rows: Vec<Row>,
    row_ids: Vec<RowId>,
    columns: Vec<Column>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(INITIAL_ROWS, INITIAL_COLS)
    }
}

fn empty_row(width: usize) -> Row {
    vec![Cell::default(); width].into()
}

impl Document {
    /// Create an empty grid. Both dimensions are raised to at least one.
    pub fn new(rows: usize, cols: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            rows: (0..rows).map(|_| empty_row(cols)).collect(),
            row_ids: (0..rows).map(|_| RowId::generate()).collect(),
            columns: (1..=cols).map(Column::at_position).collect(),
        }
    }

    /// Build a document from an imported table.
    ///
    /// Short rows are padded, long rows truncated to the header width. An
    /// empty row set yields a single empty row.
    pub fn from_table(table: &Table) -> Result<Self, DocumentError> {
        let width = table.width();
        if width == 0 {
            return Err(DocumentError::NoColumns);
        }

        let columns = table.headers.iter().map(Column::named).collect();
        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .map(|values| {
                (0..width)
                    .map(|c| values.get(c).map(Cell::new).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect();
        if rows.is_empty() {
            rows.push(empty_row(width));
        }
        let row_ids = rows.iter().map(|_| RowId::generate()).collect();

        Ok(Self { rows, row_ids, columns })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, col: usize) -> Option<&Column> {
        self.columns.get(col)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Cell value, or "" when out of range
    pub fn value(&self, row: usize, col: usize) -> &str {
        self.cell(row, col).map(|c| c.value.as_str()).unwrap_or("")
    }

    /// Current index of a column, looked up by id
    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == id)
    }

    pub fn row_id(&self, row: usize) -> Option<&RowId> {
        self.row_ids.get(row)
    }

    /// Current index of a row, looked up by id
    pub fn row_index(&self, id: &RowId) -> Option<usize> {
        self.row_ids.iter().position(|r| r == id)
    }

    /// Like `row_index`, but checks `hint` first. Callers walking the grid
    /// pass the index they last saw the row at.
    pub fn locate_row(&self, id: &RowId, hint: usize) -> Option<usize> {
        match self.row_ids.get(hint) {
            Some(found) if found == id => Some(hint),
            _ => self.row_index(id),
        }
    }

    /// Export boundary: column names and the string grid
    pub fn to_table(&self) -> Table {
        Table {
            headers: self.columns.iter().map(|c| c.name.clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().map(|c| c.value.clone()).collect())
                .collect(),
        }
    }

    fn check_row(&self, row: usize) -> Result<(), DocumentError> {
        if row < self.rows.len() {
            Ok(())
        } else {
            Err(DocumentError::RowOutOfRange { row, rows: self.rows.len() })
        }
    }

    fn check_col(&self, col: usize) -> Result<(), DocumentError> {
        if col < self.columns.len() {
            Ok(())
        } else {
            Err(DocumentError::ColumnOutOfRange { col, cols: self.columns.len() })
        }
    }

    // -------------------------------------------------------------------------
    // Mutations (each returns a new document)
    // -------------------------------------------------------------------------

    /// Append a row of empty cells
    pub fn add_row(&self) -> Self {
        let mut next = self.clone();
        next.rows.push(empty_row(self.columns.len()));
        next.row_ids.push(RowId::generate());
        next
    }

    /// Append a column named after its 1-based position; every row gains an
    /// empty cell.
    pub fn add_column(&self) -> Self {
        let mut next = self.clone();
        next.columns.push(Column::at_position(self.columns.len() + 1));
        for row in &mut next.rows {
            let mut cells = row.to_vec();
            cells.push(Cell::default());
            *row = cells.into();
        }
        next
    }

    /// Remove a row. Returns `Ok(None)` when it is the last remaining row.
    pub fn delete_row(&self, row: usize) -> Result<Option<Self>, DocumentError> {
        self.check_row(row)?;
        if self.rows.len() <= 1 {
            return Ok(None);
        }
        let mut next = self.clone();
        next.rows.remove(row);
        next.row_ids.remove(row);
        Ok(Some(next))
    }

    /// Remove a column and its cells. Returns `Ok(None)` when it is the last
    /// remaining column.
    pub fn delete_column(&self, col: usize) -> Result<Option<Self>, DocumentError> {
        self.check_col(col)?;
        if self.columns.len() <= 1 {
            return Ok(None);
        }
        let mut next = self.clone();
        next.columns.remove(col);
        for row in &mut next.rows {
            let mut cells = row.to_vec();
            cells.remove(col);
            *row = cells.into();
        }
        Ok(Some(next))
    }

    pub fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<Self, DocumentError> {
        self.check_row(row)?;
        self.check_col(col)?;
        let mut next = self.clone();
        let mut cells = next.rows[row].to_vec();
        cells[col] = Cell { value: value.to_string(), ..cells[col].clone() };
        next.rows[row] = cells.into();
        Ok(next)
    }

    pub fn rename_column(&self, col: usize, name: &str) -> Result<Self, DocumentError> {
        self.with_column(col, |c| c.name = name.to_string())
    }

    pub fn resize_column(&self, col: usize, width: u32) -> Result<Self, DocumentError> {
        if width == 0 {
            return Err(DocumentError::InvalidWidth);
        }
        self.with_column(col, |c| c.width = width)
    }

    pub fn set_prompt(&self, col: usize, prompt: &str) -> Result<Self, DocumentError> {
        self.with_column(col, |c| c.prompt = prompt.to_string())
    }

    /// Bulk import: a whole new document built from `table`
    pub fn replace(&self, table: &Table) -> Result<Self, DocumentError> {
        Self::from_table(table)
    }

    /// Apply an edit to one column's metadata
    pub fn with_column(
        &self,
        col: usize,
        edit: impl FnOnce(&mut Column),
    ) -> Result<Self, DocumentError> {
        self.check_col(col)?;
        let mut next = self.clone();
        edit(&mut next.columns[col]);
        Ok(next)
    }

    /// Copy live job state (`is_processing`, `last_error`) from `live` onto
    /// the columns of `self`, matching by id. Used when a snapshot is brought
    /// back by undo/redo.
    pub fn with_job_state_from(&self, live: &Document) -> Self {
        let mut next = self.clone();
        for column in &mut next.columns {
            match live.columns.iter().find(|c| c.id == column.id) {
                Some(current) => {
                    column.is_processing = current.is_processing;
                    column.last_error = current.last_error.clone();
                }
                None => {
                    column.is_processing = false;
                    column.last_error = None;
                }
            }
        }
        next
    }

    /// Check the structural invariants. Always true for documents built
    /// through this API.
    pub fn is_well_formed(&self) -> bool {
        !self.rows.is_empty()
            && !self.columns.is_empty()
            && self.row_ids.len() == self.rows.len()
            && self.rows.iter().all(|r| r.len() == self.columns.len())
    }
}
