//! contact-lake - Contact Record Export Pipeline and Query Gateway
//!
//! Moves contact-center records from an indexed, schemaless source store
//! into a date-partitioned Parquet lake, keeping an append-only column
//! catalog in sync as the record shape evolves, and serves the lake
//! through a SELECT-only SQL gateway.
//!
//! # Features
//!
//! - **Schema discovery**: column names and types are inferred from the
//!   records themselves; the catalog only ever grows, and existing
//!   columns are never retyped.
//!
//! - **Date partitioning**: each record's event date places it under a
//!   Hive-style `year=/month=/day=` key, deterministically across every
//!   supported date encoding.
//!
//! - **Skip, never abort**: malformed records are counted and skipped;
//!   one bad row cannot sink a batch.
//!
//! - **Long-format survey view**: wide question/answer column pairs are
//!   unpivoted into a `(topic, question, answer)` view regenerated from
//!   the catalog on every schema change.
//!
//! - **Asynchronous queries**: the gateway hands SQL to the engine and
//!   lets callers poll; results page out as JSON and download as the raw
//!   CSV the engine produced.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   paged range scan   ┌─────────────────────────┐
//! │ source store │ ───────────────────▶ │     export pipeline      │
//! │  (RocksDB)   │                      │ date parse → partition   │
//! └──────────────┘                      │ group → Parquet per day  │
//!                                       └───────────┬─────────────┘
//!                                                   │ files first,
//!                                                   ▼ then schema
//! ┌──────────────┐   add-columns DDL    ┌─────────────────────────┐
//! │ schema sync  │ ◀─────────────────── │   partitioned lake       │
//! │ (catalog +   │                      │ exports/year=/month=/day=│
//! │  Q/A view)   │                      └───────────┬─────────────┘
//! └──────────────┘                                  │
//!                                                   ▼
//!                                       ┌─────────────────────────┐
//!                                       │  query gateway (axum)    │
//!                                       │ SELECT gate → DataFusion │
//!                                       │ poll / fetch / download  │
//!                                       └─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Load demo records, create the table, export yesterday
//! contact-lake seed --count 500
//! contact-lake bootstrap
//! contact-lake export --range previous-day
//!
//! # Query the lake
//! contact-lake serve --port 8080
//! curl -s localhost:8080/api/stats
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod gateway;
pub mod record;
pub mod schema;
pub mod store;

pub use config::{CliArgs, Command, LakeConfig};
pub use error::{LakeError, Result};
pub use export::{ExportOptions, ExportSummary, Exporter};
pub use gateway::{QueryGateway, QueryNames};
pub use schema::{Catalog, SchemaSync};
pub use store::{RocksStore, SourceStore};
