//! Source store interface.
//!
//! The indexed key-value store the export pipeline reads from, specified
//! as a capability interface: a bounded unordered sample for schema
//! discovery, and a paged range query over the fixed partition-key /
//! sort-key index for exports.

pub mod rocks;
pub mod seed;

use crate::error::StoreResult;
use crate::export::partition::DateRange;
use crate::record::Record;

pub use rocks::{RocksStore, StoreStats};

/// Opaque continuation token for paged range queries. Callers treat it as
/// a cursor: feed the token from one page into the next request until it
/// comes back `None`.
pub type ContinuationToken = Vec<u8>;

/// One page of records from a range query.
#[derive(Debug, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub next: Option<ContinuationToken>,
}

/// Capability interface over the source key-value store.
pub trait SourceStore {
    /// Query records under the given partition-key value whose sort key
    /// falls within `range`, returning up to `page_size` records and a
    /// continuation token when more remain.
    fn query_range(
        &self,
        partition_value: &str,
        range: DateRange,
        token: Option<&ContinuationToken>,
        page_size: usize,
    ) -> StoreResult<Page>;

    /// Bounded unordered scan of up to `limit` records, used by schema
    /// bootstrap. No ordering guarantee.
    fn sample(&self, limit: usize) -> StoreResult<Vec<Record>>;
}
