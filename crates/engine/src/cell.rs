use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width given to every new or imported column
pub const DEFAULT_COLUMN_WIDTH: u32 = 200;

/// A single grid cell
///
/// `is_editing` is transient UI state. It travels with the cell but is
/// ignored by equality so snapshots compare on data only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub value: String,
    #[serde(default)]
    pub is_editing: bool,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Cell {}

impl Cell {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_editing: false,
        }
    }

    /// True when the value is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// Opaque column identifier, stable across renames and moves
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque row identifier. Survives deletes of other rows, so a job can find
/// the row it read from after the grid has shifted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId(String);

impl RowId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column metadata
///
/// `prompt` is the transformation instruction for a column job; an empty
/// prompt means the column has no job. `is_processing` and `last_error`
/// mirror live job state and are never restored by undo/redo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub is_processing: bool,
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Column {
    /// New column with a generated id and the default name for a 1-based position
    pub fn at_position(position: usize) -> Self {
        Self::named(default_column_name(position))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: ColumnId::generate(),
            name: name.into(),
            prompt: String::new(),
            is_processing: false,
            width: DEFAULT_COLUMN_WIDTH,
            last_error: None,
        }
    }

    /// True when the column carries a runnable prompt
    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }
}

// Job state is excluded so that history comparisons see structure only.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.prompt == other.prompt
            && self.width == other.width
    }
}

impl Eq for Column {}

/// Default display name for a column at a 1-based position
pub fn default_column_name(position: usize) -> String {
    format!("Column {}", position)
}
