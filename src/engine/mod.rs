//! Query engine capability interface.
//!
//! The SQL engine is an external collaborator: schema sync issues catalog
//! DDL through it, and the gateway drives asynchronous query executions
//! against it. `LocalEngine` is the DataFusion-backed implementation used
//! in this deployment.

pub mod local;

use crate::error::{GatewayResult, SchemaResult};
use crate::schema::catalog::ColumnDef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub use local::LocalEngine;

/// Query execution lifecycle states. Advanced only by polling; SUCCEEDED,
/// FAILED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecState::Succeeded | ExecState::Failed | ExecState::Cancelled
        )
    }
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecState::Submitted => "SUBMITTED",
            ExecState::Running => "RUNNING",
            ExecState::Succeeded => "SUCCEEDED",
            ExecState::Failed => "FAILED",
            ExecState::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// Engine-reported status of one execution.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub state: ExecState,
    pub error_message: Option<String>,
    pub row_count: Option<u64>,
    pub result_location: Option<String>,
}

/// One page of result rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub has_more: bool,
}

/// Capability interface over the SQL query engine.
///
/// DDL operations carry the idempotency contract the schema layer relies
/// on: `add_columns` reports `AlreadyExists` when every requested column
/// is already present, and callers treat that as success.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Create (or wholesale replace) the lake table with the given data
    /// columns. Partition columns are implied.
    async fn create_table(&self, columns: Vec<ColumnDef>) -> SchemaResult<()>;

    /// Current data columns of the lake table, or None before bootstrap.
    async fn table_columns(&self) -> SchemaResult<Option<Vec<ColumnDef>>>;

    /// Additive schema alteration: add the given columns. Errors with
    /// `AlreadyExists` when nothing is new.
    async fn add_columns(&self, columns: Vec<ColumnDef>) -> SchemaResult<()>;

    /// Drop-and-recreate a view from its definition SQL.
    async fn replace_view(&self, view: &str, sql: &str) -> SchemaResult<()>;

    /// Drop a view if it exists.
    async fn drop_view(&self, view: &str) -> SchemaResult<()>;

    /// Hand SQL to the engine; returns the new execution's id immediately.
    async fn start_query(&self, sql: &str) -> GatewayResult<Uuid>;

    /// Engine-side status of an execution.
    async fn query_status(&self, id: Uuid) -> GatewayResult<EngineStatus>;

    /// Fetch result rows once an execution has SUCCEEDED.
    async fn result_rows(&self, id: Uuid, offset: usize, limit: usize)
        -> GatewayResult<ResultPage>;

    /// Path of the raw CSV result object for a SUCCEEDED execution.
    async fn result_object(&self, id: Uuid) -> GatewayResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ExecState::Succeeded.is_terminal());
        assert!(ExecState::Failed.is_terminal());
        assert!(ExecState::Cancelled.is_terminal());
        assert!(!ExecState::Submitted.is_terminal());
        assert!(!ExecState::Running.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ExecState::Succeeded).unwrap(),
            "\"SUCCEEDED\""
        );
        assert_eq!(ExecState::Running.to_string(), "RUNNING");
    }
}
