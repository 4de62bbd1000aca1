//! RocksDB-backed source store.
//!
//! Key layout mirrors the source index: `pk \0 be64(sort_ts_millis) \0
//! record_id`. Big-endian sort timestamps make prefix iteration return
//! records in chronological order, which is what the range query pages
//! over. Records are stored as JSON objects because the source is
//! schemaless.

use crate::error::{StoreError, StoreResult};
use crate::export::partition::DateRange;
use crate::record::Record;
use crate::store::{ContinuationToken, Page, SourceStore};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::path::Path;
use uuid::Uuid;

/// Column family names
pub const CF_RECORDS: &str = "records";
pub const CF_METADATA: &str = "metadata";

/// Metadata keys
pub mod meta_keys {
    pub const RECORD_COUNT: &str = "record_count";
    pub const LAST_SEED_TIME: &str = "last_seed_time";
    pub const SOURCE_NAME: &str = "source_name";
}

const KEY_SEP: u8 = 0;

/// Encode a record key: partition value, sort timestamp, record id.
fn encode_record_key(partition_value: &str, sort_ts_millis: i64, record_id: &Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(partition_value.len() + 1 + 8 + 1 + 16);
    key.extend_from_slice(partition_value.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(&(sort_ts_millis as u64).to_be_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(record_id.as_bytes());
    key
}

/// Key prefix bounding a partition value + timestamp. Used for range
/// starts and exclusive ends.
fn encode_bound(partition_value: &str, sort_ts_millis: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(partition_value.len() + 1 + 8);
    key.extend_from_slice(partition_value.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(&(sort_ts_millis as u64).to_be_bytes());
    key
}

fn records_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_write_buffer_size(32 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

fn metadata_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_write_buffer_size(4 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    opts
}

fn db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts
}

/// Summary counters read from the metadata column family.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub record_count: u64,
    pub last_seed_time: Option<String>,
}

/// RocksDB handle wrapper with column family accessors.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, records_cf_options()),
            ColumnFamilyDescriptor::new(CF_METADATA, metadata_cf_options()),
        ];
        let db = DB::open_cf_descriptors(&db_options(), path, cf_descriptors)?;
        Ok(Self { db })
    }

    fn cf_records(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(CF_RECORDS).expect("records CF missing")
    }

    fn cf_metadata(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(CF_METADATA).expect("metadata CF missing")
    }

    /// Set metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db
            .put_cf(self.cf_metadata(), key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    /// Get metadata value
    pub fn get_metadata(&self, key: &str) -> StoreResult<Option<String>> {
        match self.db.get_cf(self.cf_metadata(), key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            None => Ok(None),
        }
    }

    /// Insert one record under the partition value and sort timestamp.
    pub fn put_record(
        &self,
        partition_value: &str,
        sort_ts: DateTime<Utc>,
        record: &Record,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let key = encode_record_key(partition_value, sort_ts.timestamp_millis(), &id);
        let value = serde_json::to_vec(&record.to_json())?;
        self.db.put_cf(self.cf_records(), &key, &value)?;
        Ok(id)
    }

    /// Insert a batch of records and refresh the count metadata.
    pub fn put_batch(
        &self,
        partition_value: &str,
        records: &[(DateTime<Utc>, Record)],
    ) -> StoreResult<()> {
        for (ts, record) in records {
            self.put_record(partition_value, *ts, record)?;
        }
        let count = self.count_records()?;
        self.set_metadata(meta_keys::RECORD_COUNT, &count.to_string())?;
        self.set_metadata(meta_keys::LAST_SEED_TIME, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Count records (by iterating - O(n))
    pub fn count_records(&self) -> StoreResult<u64> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(self.cf_records(), IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Read the stats counters.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let record_count = self
            .get_metadata(meta_keys::RECORD_COUNT)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let last_seed_time = self.get_metadata(meta_keys::LAST_SEED_TIME)?;
        Ok(StoreStats {
            record_count,
            last_seed_time,
        })
    }

    fn decode_record(key: &[u8], value: &[u8]) -> StoreResult<Record> {
        let json: serde_json::Value =
            serde_json::from_slice(value).map_err(|e| StoreError::Corrupt {
                key: String::from_utf8_lossy(key).to_string(),
                reason: e.to_string(),
            })?;
        if !json.is_object() {
            return Err(StoreError::Corrupt {
                key: String::from_utf8_lossy(key).to_string(),
                reason: "expected a JSON object".to_string(),
            });
        }
        Ok(Record::from_json(&json))
    }
}

impl SourceStore for RocksStore {
    fn query_range(
        &self,
        partition_value: &str,
        range: DateRange,
        token: Option<&ContinuationToken>,
        page_size: usize,
    ) -> StoreResult<Page> {
        // Resume just past the last-seen key, or at the window start.
        let start_key = match token {
            Some(last) => {
                let mut k = last.clone();
                k.push(0);
                k
            }
            None => encode_bound(partition_value, range.start.timestamp_millis()),
        };
        let end_key = encode_bound(partition_value, range.end.timestamp_millis());

        let mut records = Vec::with_capacity(page_size.min(1024));
        let mut last_key: Option<Vec<u8>> = None;
        let mut more = false;

        let iter = self.db.iterator_cf(
            self.cf_records(),
            IteratorMode::From(&start_key, Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            // End is exclusive
            if key.as_ref() >= end_key.as_slice() {
                break;
            }
            if records.len() >= page_size {
                more = true;
                break;
            }
            records.push(Self::decode_record(&key, &value)?);
            last_key = Some(key.to_vec());
        }

        Ok(Page {
            records,
            next: if more { last_key } else { None },
        })
    }

    fn sample(&self, limit: usize) -> StoreResult<Vec<Record>> {
        let mut records = Vec::with_capacity(limit.min(1024));
        for item in self.db.iterator_cf(self.cf_records(), IteratorMode::Start) {
            let (key, value) = item?;
            records.push(Self::decode_record(&key, &value)?);
            if records.len() >= limit {
                break;
            }
        }
        Ok(records)
    }
}
