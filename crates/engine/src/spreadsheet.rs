//! Editing session: the single mutation path.
//!
//! Every data-changing call (user edit or job write-back) builds a new
//! `Document` and commits it to `History`. Job state (`is_processing`,
//! `last_error`) is amended onto the current snapshot without a commit.
//!
//! Filters are view state. Each one remembers the id of the column it was
//! added on, and its `column_index` is recomputed whenever the column layout
//! can change (delete, undo, redo). A filter whose column is gone is dropped.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::{Cell, Column, ColumnId};
use crate::document::{Document, DocumentError, Row};
use crate::filter::{self, Filter, FilterSet};
use crate::history::History;
use crate::table::Table;

/// A spreadsheet shared between the editor and running column jobs
pub type SharedSpreadsheet = Arc<Mutex<Spreadsheet>>;

#[derive(Debug, Clone, Default)]
pub struct Spreadsheet {
    history: History,
    filters: FilterSet,
    /// Target column of each filter, parallel to `filters`
    filter_columns: Vec<ColumnId>,
}

impl Spreadsheet {
    pub fn new(document: Document) -> Self {
        Self {
            history: History::new(document),
            filters: FilterSet::new(),
            filter_columns: Vec::new(),
        }
    }

    pub fn from_table(table: &Table) -> Result<Self, DocumentError> {
        Ok(Self::new(Document::from_table(table)?))
    }

    pub fn into_shared(self) -> SharedSpreadsheet {
        Arc::new(Mutex::new(self))
    }

    pub fn document(&self) -> &Document {
        self.history.current()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn columns(&self) -> &[Column] {
        self.document().columns()
    }

    pub fn rows(&self) -> &[Row] {
        self.document().rows()
    }

    pub fn row_count(&self) -> usize {
        self.document().row_count()
    }

    pub fn column_count(&self) -> usize {
        self.document().column_count()
    }

    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.document().column_index(id)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.document().cell(row, col)
    }

    fn commit(&mut self, next: Document) -> &Document {
        debug_assert!(next.is_well_formed());
        self.history.commit(next);
        self.history.current()
    }

    // -------------------------------------------------------------------------
    // Data mutations (versioned)
    // -------------------------------------------------------------------------

    pub fn add_row(&mut self) -> &Document {
        let next = self.document().add_row();
        self.commit(next)
    }

    pub fn add_column(&mut self) -> &Document {
        let next = self.document().add_column();
        self.commit(next)
    }

    /// Delete a row. Deleting the last remaining row is a no-op.
    pub fn delete_row(&mut self, row: usize) -> Result<&Document, DocumentError> {
        match self.document().delete_row(row)? {
            Some(next) => Ok(self.commit(next)),
            None => Ok(self.document()),
        }
    }

    /// Delete a column. Deleting the last remaining column is a no-op.
    /// Filters on the deleted column are dropped, filters to its right shift
    /// left with their columns.
    pub fn delete_column(&mut self, col: usize) -> Result<&Document, DocumentError> {
        match self.document().delete_column(col)? {
            Some(next) => {
                self.commit(next);
                self.sync_filters();
                Ok(self.document())
            }
            None => Ok(self.document()),
        }
    }

    pub fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<&Document, DocumentError> {
        let next = self.document().update_cell(row, col, value)?;
        Ok(self.commit(next))
    }

    pub fn rename_column(&mut self, col: usize, name: &str) -> Result<&Document, DocumentError> {
        let next = self.document().rename_column(col, name)?;
        Ok(self.commit(next))
    }

    pub fn resize_column(&mut self, col: usize, width: u32) -> Result<&Document, DocumentError> {
        let next = self.document().resize_column(col, width)?;
        Ok(self.commit(next))
    }

    pub fn set_prompt(&mut self, col: usize, prompt: &str) -> Result<&Document, DocumentError> {
        let next = self.document().set_prompt(col, prompt)?;
        Ok(self.commit(next))
    }

    /// Replace the whole document from an import. History restarts at the
    /// imported state and filters are cleared.
    pub fn import(&mut self, table: &Table) -> Result<&Document, DocumentError> {
        let next = self.document().replace(table)?;
        self.history.reset(next);
        self.clear_filters();
        Ok(self.document())
    }

    /// Export boundary
    pub fn export(&self) -> Table {
        self.document().to_table()
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Step back one snapshot. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let live = self.document().clone();
        match self.history.undo() {
            Some(prev) => {
                let restored = prev.with_job_state_from(&live);
                self.history.amend(restored);
                self.sync_filters();
                true
            }
            None => false,
        }
    }

    /// Step forward one snapshot. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let live = self.document().clone();
        match self.history.redo() {
            Some(next) => {
                let restored = next.with_job_state_from(&live);
                self.history.amend(restored);
                self.sync_filters();
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // -------------------------------------------------------------------------
    // Job state (not versioned)
    // -------------------------------------------------------------------------

    fn amend_column(&mut self, id: &ColumnId, edit: impl FnOnce(&mut Column)) -> bool {
        let Some(col) = self.column_index(id) else {
            return false;
        };
        match self.document().with_column(col, edit) {
            Ok(next) => {
                self.history.amend(next);
                true
            }
            Err(_) => false,
        }
    }

    /// Set the processing flag of a column. Returns false if the column no
    /// longer exists.
    pub fn set_processing(&mut self, id: &ColumnId, processing: bool) -> bool {
        self.amend_column(id, |c| c.is_processing = processing)
    }

    pub fn is_processing(&self, id: &ColumnId) -> bool {
        self.column_index(id)
            .and_then(|i| self.document().column(i))
            .map(|c| c.is_processing)
            .unwrap_or(false)
    }

    /// Record (or clear) the job status message of a column
    pub fn set_column_status(&mut self, id: &ColumnId, message: Option<String>) -> bool {
        self.amend_column(id, |c| c.last_error = message)
    }

    /// Flip a column's job state: a running column is asked to stop and
    /// `false` is returned; an idle column returns `true`, meaning the caller
    /// should start a job for it.
    pub fn toggle_processing(&mut self, col: usize) -> Result<bool, DocumentError> {
        let column = self
            .document()
            .column(col)
            .ok_or(DocumentError::ColumnOutOfRange { col, cols: self.column_count() })?;
        if column.is_processing {
            let id = column.id.clone();
            self.set_processing(&id, false);
            Ok(false)
        } else {
            Ok(true)
        }
    }

    // -------------------------------------------------------------------------
    // Filters (view only)
    // -------------------------------------------------------------------------

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Add a filter on an existing column
    pub fn add_filter(&mut self, filter: Filter) -> Result<(), DocumentError> {
        let id = self
            .document()
            .column(filter.column_index)
            .map(|c| c.id.clone())
            .ok_or(DocumentError::ColumnOutOfRange {
                col: filter.column_index,
                cols: self.column_count(),
            })?;
        self.filters.add(filter);
        self.filter_columns.push(id);
        Ok(())
    }

    pub fn remove_filter(&mut self, index: usize) -> Option<Filter> {
        let removed = self.filters.remove(index)?;
        self.filter_columns.remove(index);
        Some(removed)
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.filter_columns.clear();
    }

    /// Point every filter back at its column's current index
    fn sync_filters(&mut self) {
        let doc = self.history.current();
        let mut filters = Vec::with_capacity(self.filter_columns.len());
        let mut targets = Vec::with_capacity(self.filter_columns.len());
        for (filter, id) in self.filters.iter().zip(&self.filter_columns) {
            if let Some(column_index) = doc.column_index(id) {
                filters.push(Filter { column_index, ..filter.clone() });
                targets.push(id.clone());
            }
        }

        let dropped = self.filter_columns.len() - targets.len();
        if dropped > 0 {
            log::debug!("Dropped {} filter(s) whose column no longer exists", dropped);
        }
        self.filters = FilterSet::from(filters);
        self.filter_columns = targets;
    }

    /// Rows visible under the active filters
    pub fn filtered_rows(&self) -> Vec<Row> {
        let doc = self.document();
        filter::evaluate(doc.rows(), doc.columns(), self.filters.as_slice())
    }

    /// Data-row indices visible under the active filters
    pub fn visible_row_indices(&self) -> Vec<usize> {
        let doc = self.document();
        filter::matching_rows(doc.rows(), doc.columns(), self.filters.as_slice())
    }

    /// Export of the visible rows only
    pub fn export_filtered(&self) -> Table {
        self.export().select_rows(&self.visible_row_indices())
    }
}
