//! Typed row filters.
//!
//! A filter set narrows what the user sees; it never changes the document
//! and never affects which rows a column job processes.
//!
//! Key rules:
//! - filters combine with AND
//! - evaluation is pure and keeps the input row order
//! - unparsable cell values exclude the row (Number, Date)
//! - an operator that does not belong to the filter's kind lets the row
//!   through. This is a defensive default so a malformed filter cannot
//!   silently hide data; it is not a supported way to write filters.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::{Cell, Column};

// =============================================================================
// Filter definition
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Text,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    Empty,
    NotEmpty,
}

impl FilterOperator {
    /// Whether this operator is defined for `kind`
    pub fn applies_to(self, kind: FilterKind) -> bool {
        use FilterOperator::*;
        match kind {
            FilterKind::Text => matches!(self, Contains | Equals | StartsWith | EndsWith | Empty | NotEmpty),
            FilterKind::Number | FilterKind::Date => {
                matches!(self, Equals | GreaterThan | LessThan | Between)
            }
            FilterKind::Boolean => self == Equals,
        }
    }

    /// Whether the operator reads `value`
    pub fn takes_value(self) -> bool {
        !matches!(self, FilterOperator::Empty | FilterOperator::NotEmpty)
    }
}

/// One predicate on one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub column_index: usize,
    pub kind: FilterKind,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
    /// Upper bound; only read by `Between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<String>,
}

impl Filter {
    pub fn new(
        column_index: usize,
        kind: FilterKind,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            column_index,
            kind,
            operator,
            value: value.into(),
            value2: None,
        }
    }

    pub fn text(column_index: usize, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self::new(column_index, FilterKind::Text, operator, value)
    }

    pub fn number(column_index: usize, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self::new(column_index, FilterKind::Number, operator, value)
    }

    pub fn date(column_index: usize, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self::new(column_index, FilterKind::Date, operator, value)
    }

    pub fn boolean(column_index: usize, value: impl Into<String>) -> Self {
        Self::new(column_index, FilterKind::Boolean, FilterOperator::Equals, value)
    }

    /// Inclusive range filter for Number or Date columns
    pub fn between(
        column_index: usize,
        kind: FilterKind,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Self {
            value2: Some(high.into()),
            ..Self::new(column_index, kind, FilterOperator::Between, low)
        }
    }

    /// Test one row. Rows too short for `column_index` fail.
    pub fn matches(&self, row: &[Cell]) -> bool {
        let Some(cell) = row.get(self.column_index) else {
            return false;
        };
        if !self.operator.applies_to(self.kind) {
            return true;
        }
        let value = cell.value.as_str();
        match self.kind {
            FilterKind::Text => self.matches_text(value),
            FilterKind::Number => self.matches_number(value),
            FilterKind::Date => self.matches_date(value),
            FilterKind::Boolean => {
                (value.to_lowercase() == "true") == (self.value.to_lowercase() == "true")
            }
        }
    }

    fn matches_text(&self, value: &str) -> bool {
        let haystack = value.to_lowercase();
        let needle = self.value.to_lowercase();
        match self.operator {
            FilterOperator::Contains => haystack.contains(&needle),
            FilterOperator::Equals => haystack == needle,
            FilterOperator::StartsWith => haystack.starts_with(&needle),
            FilterOperator::EndsWith => haystack.ends_with(&needle),
            FilterOperator::Empty => value.trim().is_empty(),
            FilterOperator::NotEmpty => !value.trim().is_empty(),
            _ => true,
        }
    }

    fn matches_number(&self, value: &str) -> bool {
        let Some(n) = parse_number(value) else {
            return false;
        };
        let bound = parse_number(&self.value).unwrap_or(f64::NAN);
        match self.operator {
            FilterOperator::Equals => n == bound,
            FilterOperator::GreaterThan => n > bound,
            FilterOperator::LessThan => n < bound,
            FilterOperator::Between => match self.value2.as_deref() {
                Some(high) => {
                    let high = parse_number(high).unwrap_or(f64::NAN);
                    n >= bound && n <= high
                }
                None => false,
            },
            _ => true,
        }
    }

    fn matches_date(&self, value: &str) -> bool {
        let Some(instant) = parse_date(value) else {
            return false;
        };
        let Some(bound) = parse_date(&self.value) else {
            return false;
        };
        match self.operator {
            FilterOperator::Equals => instant.date_naive() == bound.date_naive(),
            FilterOperator::GreaterThan => instant > bound,
            FilterOperator::LessThan => instant < bound,
            FilterOperator::Between => match self.value2.as_deref().and_then(parse_date) {
                Some(high) => instant >= bound && instant <= high,
                None => false,
            },
            _ => true,
        }
    }

    /// Parse a compact filter expression: `<col>:<kind>:<op>[:<value>]`.
    ///
    /// `between` takes its bounds as `<low>..<high>`. The value keeps any
    /// further colons, so `0:date:greaterThan:2024-01-01T10:00:00Z` works.
    ///
    /// ```
    /// use promptgrid_engine::filter::{Filter, FilterKind, FilterOperator};
    ///
    /// let f = Filter::parse_expr("1:number:between:5..10").unwrap();
    /// assert_eq!(f.column_index, 1);
    /// assert_eq!(f.kind, FilterKind::Number);
    /// assert_eq!(f.operator, FilterOperator::Between);
    /// assert_eq!(f.value2.as_deref(), Some("10"));
    /// ```
    pub fn parse_expr(expr: &str) -> Result<Self, FilterParseError> {
        let mut parts = expr.splitn(4, ':');
        let (Some(col), Some(kind), Some(op)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(FilterParseError::Syntax(expr.to_string()));
        };
        let column_index = col
            .trim()
            .parse::<usize>()
            .map_err(|_| FilterParseError::Column(col.to_string()))?;
        let kind: FilterKind = kind.trim().parse()?;
        let operator: FilterOperator = op.trim().parse()?;
        let raw = parts.next().unwrap_or("");

        if operator.takes_value() && raw.is_empty() {
            return Err(FilterParseError::MissingValue(expr.to_string()));
        }

        if operator == FilterOperator::Between {
            let Some((low, high)) = raw.split_once("..") else {
                return Err(FilterParseError::MissingValue(expr.to_string()));
            };
            return Ok(Self::between(column_index, kind, low, high));
        }

        Ok(Self::new(column_index, kind, operator, raw))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.column_index, self.kind, self.operator)?;
        match (&self.operator, &self.value2) {
            (FilterOperator::Between, Some(high)) => write!(f, ":{}..{}", self.value, high),
            (op, _) if op.takes_value() => write!(f, ":{}", self.value),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("expected <col>:<kind>:<op>[:<value>], got '{0}'")]
    Syntax(String),
    #[error("invalid column index '{0}'")]
    Column(String),
    #[error("unknown filter kind '{0}' (expected text, number, date, boolean)")]
    Kind(String),
    #[error("unknown filter operator '{0}'")]
    Operator(String),
    #[error("filter '{0}' needs a value")]
    MissingValue(String),
}

impl FromStr for FilterKind {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(FilterKind::Text),
            "number" => Ok(FilterKind::Number),
            "date" => Ok(FilterKind::Date),
            "boolean" | "bool" => Ok(FilterKind::Boolean),
            _ => Err(FilterParseError::Kind(s.to_string())),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterKind::Text => "text",
            FilterKind::Number => "number",
            FilterKind::Date => "date",
            FilterKind::Boolean => "boolean",
        })
    }
}

impl FromStr for FilterOperator {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use FilterOperator::*;
        match s.to_lowercase().as_str() {
            "contains" => Ok(Contains),
            "equals" | "eq" => Ok(Equals),
            "startswith" => Ok(StartsWith),
            "endswith" => Ok(EndsWith),
            "greaterthan" | "gt" => Ok(GreaterThan),
            "lessthan" | "lt" => Ok(LessThan),
            "between" => Ok(Between),
            "empty" => Ok(Empty),
            "notempty" => Ok(NotEmpty),
            _ => Err(FilterParseError::Operator(s.to_string())),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FilterOperator::*;
        f.write_str(match self {
            Contains => "contains",
            Equals => "equals",
            StartsWith => "startsWith",
            EndsWith => "endsWith",
            GreaterThan => "greaterThan",
            LessThan => "lessThan",
            Between => "between",
            Empty => "empty",
            NotEmpty => "notEmpty",
        })
    }
}

// =============================================================================
// Value parsing
// =============================================================================

/// Lenient number parse: the longest leading float literal, after leading
/// whitespace. `"12px"` is 12, `"px12"` is not a number.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    // Exponent only counts when digits follow it
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a calendar date or instant. Naive forms are read as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

// =============================================================================
// Evaluation
// =============================================================================

fn row_passes(row: &[Cell], width: usize, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|f| f.column_index < width && f.matches(row))
}

/// Rows passing every filter, in input order.
pub fn evaluate<R>(rows: &[R], columns: &[Column], filters: &[Filter]) -> Vec<R>
where
    R: AsRef<[Cell]> + Clone,
{
    rows.iter()
        .filter(|row| row_passes(row.as_ref(), columns.len(), filters))
        .cloned()
        .collect()
}

/// Indices of the rows passing every filter, ascending.
pub fn matching_rows<R>(rows: &[R], columns: &[Column], filters: &[Filter]) -> Vec<usize>
where
    R: AsRef<[Cell]>,
{
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row_passes(row.as_ref(), columns.len(), filters))
        .map(|(i, _)| i)
        .collect()
}

/// The active filters of a session, in the order they were added
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Remove the filter at `index`; out-of-range indices are ignored
    pub fn remove(&mut self, index: usize) -> Option<Filter> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn as_slice(&self) -> &[Filter] {
        &self.filters
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }
}

impl From<Vec<Filter>> for FilterSet {
    fn from(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}
