//! Schema discovery and synchronization.
//!
//! # Module Structure
//!
//! - `infer`: value-to-column-type inference (pure, total)
//! - `catalog`: the append-only column catalog
//! - `qa_view`: question/answer unpivot view generation
//! - `sync`: bootstrap, reconcile, and view regeneration against the
//!   query engine

pub mod catalog;
pub mod infer;
pub mod qa_view;
pub mod sync;

pub use catalog::{Catalog, ColumnDef, ColumnOrigin};
pub use infer::{fold_name, infer_type, ColumnType};
pub use qa_view::{build_view_sql, compute_pairs, QaPair};
pub use sync::SchemaSync;
