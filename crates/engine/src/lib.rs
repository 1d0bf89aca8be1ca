pub mod cell;
pub mod document;
pub mod filter;
pub mod history;
pub mod spreadsheet;
pub mod table;

pub use cell::{Cell, Column, ColumnId, RowId};
pub use document::{Document, DocumentError};
pub use filter::{Filter, FilterKind, FilterOperator, FilterSet};
pub use history::History;
pub use spreadsheet::{SharedSpreadsheet, Spreadsheet};
pub use table::Table;
