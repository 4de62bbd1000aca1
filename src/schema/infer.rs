//! Column type inference.
//!
//! Maps a single attribute value to a column type. Total and pure: every
//! input maps to exactly one type, no failures.

use crate::record::AttrValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column types supported by the catalog.
///
/// The set is intentionally small: the source store is schemaless and
/// everything that is not numeric lands in a string column. STRING is the
/// safe default whenever a name is seen with conflicting types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Double,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Double => write!(f, "double"),
        }
    }
}

/// Infer the column type for a single attribute value.
///
/// Numeric values and fully numeric string encodings ("9", " 4.5 ") are
/// DOUBLE; everything else, including absent values, is STRING.
pub fn infer_type(value: &AttrValue) -> ColumnType {
    match value {
        AttrValue::Num(_) => ColumnType::Double,
        AttrValue::Str(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty()
                && trimmed.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
            {
                ColumnType::Double
            } else {
                ColumnType::String
            }
        }
        AttrValue::Absent => ColumnType::String,
    }
}

/// Case-fold an attribute name into its catalog form.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Merge two inferred types for the same column name.
///
/// STRING takes precedence over DOUBLE: a column that ever held
/// non-numeric text must be able to hold it again.
pub fn widen(a: ColumnType, b: ColumnType) -> ColumnType {
    if a == ColumnType::String || b == ColumnType::String {
        ColumnType::String
    } else {
        ColumnType::Double
    }
}
