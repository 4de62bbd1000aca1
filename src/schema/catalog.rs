//! Schema catalog: the single source of truth for exported column
//! definitions.
//!
//! The catalog is append-only. Columns are added by discovery and
//! reconcile; they are never removed or retyped while the table exists.
//! Partition columns (`year`, `month`, `day`) are fixed and always present.

use crate::schema::infer::{fold_name, ColumnType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names of the fixed Hive partition columns, in path order.
pub const PARTITION_COLUMNS: [&str; 3] = ["year", "month", "day"];

/// Where a column definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrigin {
    /// Inferred from source record attributes
    Discovered,
    /// The derived canonical date column
    ExtraDate,
    /// Fixed partition column
    Partition,
}

/// A single column definition. Names are always case-folded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub origin: ColumnOrigin,
}

impl ColumnDef {
    pub fn discovered(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: fold_name(name),
            column_type,
            origin: ColumnOrigin::Discovered,
        }
    }

    pub fn extra_date(name: &str) -> Self {
        Self {
            name: fold_name(name),
            column_type: ColumnType::String,
            origin: ColumnOrigin::ExtraDate,
        }
    }
}

/// The evolving set of column definitions.
///
/// Backed by a BTreeMap so iteration order is deterministic; the generated
/// view and the batch file schemas both depend on that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    columns: BTreeMap<String, ColumnDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a column list, first-seen-wins on case-fold
    /// collisions. Partition columns are excluded; they live in the path,
    /// not in data files, and are implied by `partition_columns()`.
    pub fn from_columns(columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        let mut catalog = Self::new();
        catalog.merge_columns(columns);
        catalog
    }

    /// Additive merge: insert every column not already present (after
    /// case-folding). Existing definitions are never replaced or retyped,
    /// so merges commute across concurrent callers. Returns the columns
    /// that were actually added.
    pub fn merge_columns(
        &mut self,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) -> Vec<ColumnDef> {
        let mut added = Vec::new();
        for mut column in columns {
            column.name = fold_name(&column.name);
            if PARTITION_COLUMNS.contains(&column.name.as_str()) {
                continue;
            }
            if !self.columns.contains_key(&column.name) {
                self.columns.insert(column.name.clone(), column.clone());
                added.push(column);
            }
        }
        added
    }

    /// Data columns, sorted by name.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.values()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(&fold_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(&fold_name(name))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Names not yet present in the catalog, case-folded and deduplicated.
    pub fn missing_names<'a>(
        &self,
        observed: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut missing: Vec<String> = observed
            .into_iter()
            .map(fold_name)
            .filter(|n| {
                !self.columns.contains_key(n) && !PARTITION_COLUMNS.contains(&n.as_str())
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

/// The fixed partition column definitions. Integer-typed in the engine;
/// they never appear in data files.
pub fn partition_columns() -> Vec<(String, ColumnOrigin)> {
    PARTITION_COLUMNS
        .iter()
        .map(|name| (name.to_string(), ColumnOrigin::Partition))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_additive_and_idempotent() {
        let mut catalog = Catalog::new();
        let added = catalog.merge_columns(vec![
            ColumnDef::discovered("Channel", ColumnType::String),
            ColumnDef::discovered("nps_score", ColumnType::Double),
        ]);
        assert_eq!(added.len(), 2);
        assert_eq!(catalog.len(), 2);

        // Second identical merge adds nothing
        let added = catalog.merge_columns(vec![
            ColumnDef::discovered("channel", ColumnType::String),
            ColumnDef::discovered("NPS_Score", ColumnType::Double),
        ]);
        assert!(added.is_empty());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_names_are_case_folded() {
        let catalog = Catalog::from_columns(vec![ColumnDef::discovered(
            "WelcomeGuide_Q1",
            ColumnType::String,
        )]);
        assert!(catalog.contains("welcomeguide_q1"));
        assert_eq!(
            catalog.columns().next().unwrap().name,
            "welcomeguide_q1"
        );
    }

    #[test]
    fn test_collision_first_seen_wins() {
        let mut catalog = Catalog::new();
        catalog.merge_columns(vec![ColumnDef::discovered("Score", ColumnType::Double)]);
        // Differently-cased attribute from a later record, different type
        catalog.merge_columns(vec![ColumnDef::discovered("SCORE", ColumnType::String)]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("score").unwrap().column_type, ColumnType::Double);
    }

    #[test]
    fn test_never_retyped() {
        let mut catalog = Catalog::new();
        catalog.merge_columns(vec![ColumnDef::discovered("comment", ColumnType::String)]);
        catalog.merge_columns(vec![ColumnDef::discovered("comment", ColumnType::Double)]);
        assert_eq!(
            catalog.get("comment").unwrap().column_type,
            ColumnType::String
        );
    }

    #[test]
    fn test_missing_names() {
        let catalog =
            Catalog::from_columns(vec![ColumnDef::discovered("channel", ColumnType::String)]);
        let missing = catalog.missing_names(vec!["Channel", "nps_score", "nps_score", "year"]);
        assert_eq!(missing, vec!["nps_score"]);
    }

    #[test]
    fn test_partition_names_excluded() {
        let mut catalog = Catalog::new();
        let added = catalog.merge_columns(vec![ColumnDef::discovered("year", ColumnType::Double)]);
        assert!(added.is_empty());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_iteration_order_deterministic() {
        let catalog = Catalog::from_columns(vec![
            ColumnDef::discovered("zeta", ColumnType::String),
            ColumnDef::discovered("alpha", ColumnType::String),
        ]);
        let names: Vec<&str> = catalog.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
