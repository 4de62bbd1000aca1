//! The export pipeline: source store to partitioned lake files.
//!
//! One run covers one date window. Records are paged out of the store,
//! dated, grouped by partition, and written as one Parquet file per
//! partition. Records whose date attribute is missing or unparsable are
//! skipped and counted, never fatal. Newly discovered columns are
//! reconciled into the catalog only after every file has landed, so a
//! failed schema sync never strands half-written data.

use crate::error::{LakeError, Result};
use crate::export::partition::{
    export_file_path, parse_date, DateFormat, DateRange, DateRangeMode, OverwriteMode, PartitionId,
};
use crate::export::writer::write_partition_file;
use crate::record::Record;
use crate::schema::catalog::ColumnDef;
use crate::schema::infer::{fold_name, infer_type, widen, ColumnType};
use crate::schema::sync::SchemaSync;
use crate::store::SourceStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything one export run needs to know.
pub struct ExportOptions {
    pub lake_dir: PathBuf,
    pub prefix: String,
    /// Source partition key value the run exports (one value per run)
    pub partition_value: String,
    /// Record attribute holding the event date
    pub date_attribute: String,
    pub date_format: DateFormat,
    pub range_mode: DateRangeMode,
    pub lookback_hours: u32,
    pub overwrite_mode: OverwriteMode,
    pub page_size: usize,
}

/// Counters reported by one export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub partitions_touched: u64,
    /// Column names added to the catalog by this run
    pub new_columns: Vec<String>,
}

/// Drives export runs against one store / catalog pair.
pub struct Exporter<'a, S: SourceStore> {
    store: &'a S,
    sync: &'a SchemaSync,
    options: ExportOptions,
}

impl<'a, S: SourceStore> Exporter<'a, S> {
    pub fn new(store: &'a S, sync: &'a SchemaSync, options: ExportOptions) -> Self {
        Self {
            store,
            sync,
            options,
        }
    }

    /// Run one export covering the window implied by `now`.
    pub async fn export(&self, now: DateTime<Utc>) -> Result<ExportSummary> {
        let range = DateRange::for_mode(self.options.range_mode, self.options.lookback_hours, now);
        info!(
            partition_value = %self.options.partition_value,
            start = %range.start,
            end = %range.end,
            "Starting export run"
        );

        let mut summary = ExportSummary::default();
        let mut groups: BTreeMap<PartitionId, Vec<Record>> = BTreeMap::new();
        let mut discovered: BTreeMap<String, ColumnType> = BTreeMap::new();

        // Page the window out of the store
        let mut token = None;
        loop {
            let page = self.store.query_range(
                &self.options.partition_value,
                range,
                token.as_ref(),
                self.options.page_size,
            )?;
            for record in page.records {
                summary.records_read += 1;
                match self.partition_of(&record) {
                    Ok(partition) => {
                        observe_columns(&mut discovered, &record);
                        groups.entry(partition).or_default().push(record);
                    }
                    Err(e) => {
                        warn!(error = %e, "Skipping record");
                        summary.records_skipped += 1;
                    }
                }
            }
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        // Batch file schema: the engine's catalog (existing columns keep
        // their established types) plus whatever this batch discovered.
        let columns: Vec<ColumnDef> = discovered
            .into_iter()
            .map(|(name, column_type)| ColumnDef::discovered(&name, column_type))
            .collect();
        let mut batch_catalog = self
            .sync
            .current_catalog()
            .await
            .map_err(LakeError::Schema)?;
        batch_catalog.merge_columns(columns.iter().cloned());

        // Files land before any schema mutation; a failed reconcile must
        // never leave written data unreadable.
        let batch_ts = now;
        for (partition, records) in &groups {
            let path = export_file_path(
                &self.options.lake_dir,
                &self.options.prefix,
                *partition,
                self.options.overwrite_mode,
                batch_ts,
            );
            summary.records_written +=
                write_partition_file(&path, &batch_catalog, *partition, records)
                    .map_err(LakeError::Export)?;
            summary.partitions_touched += 1;
        }

        let (_, new_columns) = self.sync.reconcile(&columns).await.map_err(LakeError::Schema)?;
        summary.new_columns = new_columns;

        info!(
            read = summary.records_read,
            written = summary.records_written,
            skipped = summary.records_skipped,
            partitions = summary.partitions_touched,
            new_columns = summary.new_columns.len(),
            "Export run complete"
        );
        Ok(summary)
    }

    /// Derive the record's partition from its date attribute.
    fn partition_of(&self, record: &Record) -> std::result::Result<PartitionId, crate::error::ExportError> {
        let value = record
            .get_ci(&self.options.date_attribute)
            .ok_or_else(|| crate::error::ExportError::DateParse {
                value: "<missing>".to_string(),
                reason: format!("record has no '{}' attribute", self.options.date_attribute),
            })?;
        let ts = parse_date(value, self.options.date_format)?;
        Ok(PartitionId::from_datetime(ts))
    }
}

/// Fold the record's attribute names and types into the discovery map,
/// widening to STRING on conflict within the batch.
fn observe_columns(discovered: &mut BTreeMap<String, ColumnType>, record: &Record) {
    for (name, value) in &record.attrs {
        let folded = fold_name(name);
        let inferred = infer_type(value);
        discovered
            .entry(folded)
            .and_modify(|t| *t = widen(*t, inferred))
            .or_insert(inferred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, QueryEngine};
    use crate::record::AttrValue;
    use crate::store::rocks::RocksStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn record(contact: &str, date: &str) -> Record {
        let mut r = Record::new();
        r.insert("ContactId", AttrValue::Str(contact.to_string()));
        r.insert("Channel", AttrValue::Str("CHAT".to_string()));
        r.insert("InitiationTimestamp", AttrValue::Str(date.to_string()));
        r
    }

    fn options(lake_dir: PathBuf) -> ExportOptions {
        ExportOptions {
            lake_dir,
            prefix: "exports".to_string(),
            partition_value: "CHAT".to_string(),
            date_attribute: "InitiationTimestamp".to_string(),
            date_format: DateFormat::Iso,
            range_mode: DateRangeMode::PreviousDay,
            lookback_hours: 24,
            overwrite_mode: OverwriteMode::Overwrite,
            page_size: 2,
        }
    }

    async fn setup(dir: &std::path::Path) -> (RocksStore, Arc<LocalEngine>, SchemaSync) {
        let store = RocksStore::open(dir.join("source.rocks")).unwrap();
        let engine = Arc::new(
            LocalEngine::open(&dir.join("lake"), "exports", "contacts")
                .await
                .unwrap(),
        );
        let sync = SchemaSync::new(
            engine.clone(),
            "contacts",
            "contacts_long",
            "_question",
            "report_date",
        );
        (store, engine, sync)
    }

    #[tokio::test]
    async fn test_export_groups_by_partition() {
        let dir = tempdir().unwrap();
        let (store, _engine, sync) = setup(dir.path()).await;

        // Two records on the 19th, one on the 18th; window covers both days
        store.put_record("CHAT", ts("2026-02-19T10:00:00Z"), &record("c1", "2026-02-19T10:00:00Z")).unwrap();
        store.put_record("CHAT", ts("2026-02-19T11:00:00Z"), &record("c2", "2026-02-19T11:00:00Z")).unwrap();
        store.put_record("CHAT", ts("2026-02-18T09:00:00Z"), &record("c3", "2026-02-18T09:00:00Z")).unwrap();

        sync.bootstrap(&store.sample(10).unwrap()).await.unwrap();

        let mut opts = options(dir.path().join("lake"));
        opts.range_mode = DateRangeMode::PreviousWeek;
        let exporter = Exporter::new(&store, &sync, opts);
        let summary = exporter.export(ts("2026-02-20T08:00:00Z")).await.unwrap();

        assert_eq!(summary.records_read, 3);
        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.records_skipped, 0);
        assert_eq!(summary.partitions_touched, 2);

        let lake = dir.path().join("lake");
        assert!(lake.join("exports/year=2026/month=2/day=19/data.parquet").exists());
        assert!(lake.join("exports/year=2026/month=2/day=18/data.parquet").exists());
    }

    #[tokio::test]
    async fn test_bad_dates_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let (store, _engine, sync) = setup(dir.path()).await;

        store.put_record("CHAT", ts("2026-02-19T10:00:00Z"), &record("good", "2026-02-19T10:00:00Z")).unwrap();
        store.put_record("CHAT", ts("2026-02-19T11:00:00Z"), &record("bad", "not a date")).unwrap();
        let mut no_date = Record::new();
        no_date.insert("ContactId", AttrValue::Str("missing".into()));
        store.put_record("CHAT", ts("2026-02-19T12:00:00Z"), &no_date).unwrap();

        sync.bootstrap(&store.sample(10).unwrap()).await.unwrap();

        let mut opts = options(dir.path().join("lake"));
        opts.range_mode = DateRangeMode::PreviousDay;
        let exporter = Exporter::new(&store, &sync, opts);
        let summary = exporter.export(ts("2026-02-20T00:30:00Z")).await.unwrap();

        assert_eq!(summary.records_read, 3);
        assert_eq!(summary.records_written, 1);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(summary.partitions_touched, 1);
    }

    #[tokio::test]
    async fn test_new_columns_written_and_reconciled() {
        let dir = tempdir().unwrap();
        let (store, engine, sync) = setup(dir.path()).await;

        store.put_record("CHAT", ts("2026-02-19T10:00:00Z"), &record("c1", "2026-02-19T10:00:00Z")).unwrap();
        sync.bootstrap(&store.sample(10).unwrap()).await.unwrap();

        // A later record carries an attribute bootstrap never saw
        let mut r = record("c2", "2026-02-19T11:00:00Z");
        r.insert("Comment", AttrValue::Str("great service".into()));
        store.put_record("CHAT", ts("2026-02-19T11:00:00Z"), &r).unwrap();

        let mut opts = options(dir.path().join("lake"));
        opts.range_mode = DateRangeMode::PreviousDay;
        let exporter = Exporter::new(&store, &sync, opts);
        let summary = exporter.export(ts("2026-02-20T00:30:00Z")).await.unwrap();

        assert_eq!(summary.new_columns, vec!["comment"]);
        let columns = engine.table_columns().await.unwrap().unwrap();
        assert!(columns.iter().any(|c| c.name == "comment"));
    }

    #[tokio::test]
    async fn test_export_without_bootstrap_fails() {
        let dir = tempdir().unwrap();
        let (store, _engine, sync) = setup(dir.path()).await;
        store.put_record("CHAT", ts("2026-02-19T10:00:00Z"), &record("c1", "2026-02-19T10:00:00Z")).unwrap();

        let exporter = Exporter::new(&store, &sync, options(dir.path().join("lake")));
        let err = exporter.export(ts("2026-02-20T00:30:00Z")).await.unwrap_err();
        assert!(matches!(
            err,
            LakeError::Schema(crate::error::SchemaError::CatalogMissing)
        ));
    }

    #[tokio::test]
    async fn test_append_mode_accumulates_files() {
        let dir = tempdir().unwrap();
        let (store, _engine, sync) = setup(dir.path()).await;
        store.put_record("CHAT", ts("2026-02-19T10:00:00Z"), &record("c1", "2026-02-19T10:00:00Z")).unwrap();
        sync.bootstrap(&store.sample(10).unwrap()).await.unwrap();

        let mut opts = options(dir.path().join("lake"));
        opts.overwrite_mode = OverwriteMode::Append;
        let exporter = Exporter::new(&store, &sync, opts);
        exporter.export(ts("2026-02-20T00:30:00Z")).await.unwrap();
        exporter.export(ts("2026-02-20T02:45:00Z")).await.unwrap();

        let partition_dir = dir.path().join("lake/exports/year=2026/month=2/day=19");
        let files: Vec<_> = std::fs::read_dir(&partition_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".parquet"))
            .collect();
        assert_eq!(files.len(), 2);
    }
}
