//! Export and partitioning pipeline.
//!
//! # Module Structure
//!
//! - `partition`: date parsing, window computation, partition derivation
//! - `writer`: per-partition Parquet file writing
//! - `pipeline`: the end-to-end export run

pub mod partition;
pub mod pipeline;
pub mod writer;

pub use partition::{
    DateFormat, DateRange, DateRangeMode, OverwriteMode, PartitionId,
};
pub use pipeline::{ExportOptions, ExportSummary, Exporter};
pub use writer::write_partition_file;
