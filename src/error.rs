//! Error types for contact-lake
//!
//! One error enum per subsystem, folded into a top-level `LakeError`:
//! - Source store errors (RocksDB, corrupt records)
//! - Schema catalog and sync errors (engine DDL, throttling)
//! - Export pipeline errors (Arrow/Parquet, per-record date parsing)
//! - Query gateway errors (validation, execution lifecycle)
//! - Configuration errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Per-record failures are data, not errors: the pipeline skips and
//!   counts them instead of propagating
//! - "Already exists" from schema alteration is success, not failure

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the contact-lake application
#[derive(Error, Debug)]
pub enum LakeError {
    /// Source store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Schema catalog / sync errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Export pipeline errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Query gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// Stored record is not a JSON object
    #[error("Corrupt record at key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Schema catalog and sync errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Transient engine failure (throttling, concurrent modification);
    /// retried with backoff before surfacing
    #[error("Engine throttled: {0}")]
    Throttled(String),

    /// Column or table already exists. Callers treat this as success:
    /// concurrent exports race to add the same columns.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Catalog has not been created yet (bootstrap has not run)
    #[error("Catalog not found: run bootstrap first")]
    CatalogMissing,

    /// Terminal engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Catalog persistence error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    /// Transient errors are retried with bounded backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchemaError::Throttled(_))
    }
}

/// Export pipeline errors
#[derive(Error, Debug)]
pub enum ExportError {
    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet writer error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Source store error during paging
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Date attribute failed to parse. Per-record and non-fatal: the
    /// pipeline skips and counts, never aborts the batch.
    #[error("Cannot parse date value '{value}': {reason}")]
    DateParse { value: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// SQL text does not begin with SELECT
    #[error("Rejected query: only SELECT statements are allowed")]
    RejectedQuery,

    /// Unknown query execution id
    #[error("Unknown query execution: {0}")]
    UnknownExecution(Uuid),

    /// Execution has not reached a terminal state yet
    #[error("Query {id} not ready: state is {state}")]
    NotReady { id: Uuid, state: String },

    /// Engine reported terminal failure; message surfaced verbatim
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Presigned URL past its expiry
    #[error("Download URL expired")]
    Expired,

    /// Unknown named query type
    #[error("Unknown query type: {0}")]
    UnknownQueryType(String),

    /// Missing or invalid request parameter
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Engine-side error outside the execution lifecycle
    #[error("Engine error: {0}")]
    Engine(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;

        let (status, message) = match &self {
            GatewayError::RejectedQuery => (StatusCode::BAD_REQUEST, self.to_string()),
            GatewayError::UnknownExecution(_) => (StatusCode::NOT_FOUND, self.to_string()),
            GatewayError::UnknownQueryType(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            GatewayError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            GatewayError::NotReady { .. } => (StatusCode::CONFLICT, self.to_string()),
            GatewayError::Expired => (StatusCode::FORBIDDEN, self.to_string()),
            GatewayError::QueryFailed(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid lookback hours for LAST_N_HOURS mode
    #[error("Invalid lookback {hours}: must be between 1 and {max}")]
    InvalidLookback { hours: u32, max: u32 },

    /// Invalid fetch row limit
    #[error("Invalid max fetch rows {rows}: must be between {min} and {max}")]
    InvalidFetchRows { rows: usize, min: usize, max: usize },

    /// Invalid bootstrap sample limit
    #[error("Invalid sample limit {limit}: must be at least 1")]
    InvalidSampleLimit { limit: usize },

    /// Invalid store page size
    #[error("Invalid page size {size}: must be between {min} and {max}")]
    InvalidPageSize { size: usize, min: usize, max: usize },

    /// Invalid partition key configuration
    #[error("Invalid partition key: {0}")]
    InvalidPartitionKey(String),

    /// Path validation error
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Result type alias for LakeError
pub type Result<T> = std::result::Result<T, LakeError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for SchemaError
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Result type alias for GatewayError
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SchemaError::Throttled("rate exceeded".into()).is_transient());
        assert!(!SchemaError::AlreadyExists("column exists".into()).is_transient());
        assert!(!SchemaError::Engine("boom".into()).is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let schema_err = SchemaError::CatalogMissing;
        let lake_err: LakeError = schema_err.into();
        assert!(matches!(lake_err, LakeError::Schema(_)));
    }
}
