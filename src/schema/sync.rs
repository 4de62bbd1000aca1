//! Schema synchronization against the query engine.
//!
//! Bootstrap infers an initial catalog from a record sample and creates the
//! lake table. Reconcile adds whatever columns a batch discovered that the
//! engine does not know yet. Both paths finish by regenerating the Q/A view
//! so it always reflects the real column set.
//!
//! Engine DDL is retried on transient failures (throttling) with bounded
//! exponential backoff; "already exists" responses are treated as success
//! because concurrent exports race to add the same columns.

use crate::record::Record;
use crate::schema::catalog::{Catalog, ColumnDef};
use crate::schema::infer::{fold_name, infer_type, widen, ColumnType};
use crate::schema::qa_view::build_view_sql;
use crate::engine::QueryEngine;
use crate::error::{SchemaError, SchemaResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_DDL_ATTEMPTS: u32 = 3;

/// Names and wiring for one synchronized table/view pair.
pub struct SchemaSync {
    engine: Arc<dyn QueryEngine>,
    table: String,
    view: String,
    question_suffix: String,
    extra_date_column: String,
}

impl SchemaSync {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        table: &str,
        view: &str,
        question_suffix: &str,
        extra_date_column: &str,
    ) -> Self {
        Self {
            engine,
            table: table.to_string(),
            view: view.to_string(),
            question_suffix: question_suffix.to_string(),
            extra_date_column: extra_date_column.to_string(),
        }
    }

    /// Infer a column set from a record sample.
    ///
    /// Names are case-folded; when the same folded name carries conflicting
    /// types across the sample, STRING wins.
    pub fn infer_columns(&self, sample: &[Record]) -> Vec<ColumnDef> {
        let mut types: BTreeMap<String, ColumnType> = BTreeMap::new();
        for record in sample {
            for (name, value) in &record.attrs {
                let folded = fold_name(name);
                let inferred = infer_type(value);
                types
                    .entry(folded)
                    .and_modify(|t| *t = widen(*t, inferred))
                    .or_insert(inferred);
            }
        }
        let mut columns: Vec<ColumnDef> = types
            .into_iter()
            .map(|(name, column_type)| ColumnDef::discovered(&name, column_type))
            .collect();
        columns.push(ColumnDef::extra_date(&self.extra_date_column));
        columns
    }

    /// Create the lake table from a record sample and generate the view.
    ///
    /// Returns the catalog the table was created with.
    pub async fn bootstrap(&self, sample: &[Record]) -> SchemaResult<Catalog> {
        let columns = self.infer_columns(sample);
        let catalog = Catalog::from_columns(columns.clone());
        info!(
            table = %self.table,
            columns = catalog.len(),
            sample_records = sample.len(),
            "Bootstrapping lake table"
        );

        self.with_retries("create_table", || {
            let cols = columns.clone();
            async move { self.engine.create_table(cols).await }
        })
        .await?;

        self.regenerate_qa_view(&catalog).await?;
        Ok(catalog)
    }

    /// Current engine-side catalog, or CatalogMissing before bootstrap.
    pub async fn current_catalog(&self) -> SchemaResult<Catalog> {
        match self.engine.table_columns().await? {
            Some(columns) => Ok(Catalog::from_columns(columns)),
            None => Err(SchemaError::CatalogMissing),
        }
    }

    /// Add every column the batch discovered that the catalog lacks, then
    /// regenerate the view if anything changed.
    ///
    /// Returns the updated catalog and the names that were added.
    pub async fn reconcile(
        &self,
        discovered: &[ColumnDef],
    ) -> SchemaResult<(Catalog, Vec<String>)> {
        let mut catalog = self.current_catalog().await?;
        let added = catalog.merge_columns(discovered.iter().cloned());
        if added.is_empty() {
            debug!(table = %self.table, "Catalog already covers the batch");
            return Ok((catalog, Vec::new()));
        }

        let names: Vec<String> = added.iter().map(|c| c.name.clone()).collect();
        info!(table = %self.table, columns = ?names, "Adding columns to catalog");

        let result = self
            .with_retries("add_columns", || {
                let cols = added.clone();
                async move { self.engine.add_columns(cols).await }
            })
            .await;
        match result {
            Ok(()) => {}
            // Another writer got there first; the columns exist either way.
            Err(SchemaError::AlreadyExists(msg)) => {
                debug!(table = %self.table, %msg, "Columns already present");
            }
            Err(e) => return Err(e),
        }

        self.regenerate_qa_view(&catalog).await?;
        Ok((catalog, names))
    }

    /// Drop and recreate the long-format view from the catalog. When no
    /// question/answer pairs exist the view is dropped outright.
    pub async fn regenerate_qa_view(&self, catalog: &Catalog) -> SchemaResult<()> {
        match build_view_sql(catalog, &self.table, &self.view, &self.question_suffix) {
            Some(sql) => {
                debug!(view = %self.view, "Regenerating unpivot view");
                self.with_retries("replace_view", || {
                    let sql = sql.clone();
                    async move { self.engine.replace_view(&self.view, &sql).await }
                })
                .await
            }
            None => {
                debug!(view = %self.view, "No question/answer pairs; dropping view");
                self.with_retries("drop_view", || async {
                    self.engine.drop_view(&self.view).await
                })
                .await
            }
        }
    }

    /// Run an engine DDL call, retrying transient failures with exponential
    /// backoff. Non-transient errors surface immediately.
    async fn with_retries<F, Fut>(&self, what: &str, mut op: F) -> SchemaResult<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = SchemaResult<()>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < MAX_DDL_ATTEMPTS => {
                    let delay = Duration::from_millis(100 * (1 << (attempt - 1)));
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient engine error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineStatus, ResultPage};
    use crate::error::GatewayResult;
    use crate::record::AttrValue;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory engine that can be primed to throttle.
    #[derive(Default)]
    struct MockEngine {
        columns: Mutex<Option<Vec<ColumnDef>>>,
        view_sql: Mutex<Option<String>>,
        throttle_remaining: Mutex<u32>,
        add_calls: Mutex<u32>,
        always_exists: Mutex<bool>,
    }

    impl MockEngine {
        fn throttling(n: u32) -> Self {
            let engine = Self::default();
            *engine.throttle_remaining.lock().unwrap() = n;
            engine
        }

        fn maybe_throttle(&self) -> SchemaResult<()> {
            let mut remaining = self.throttle_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SchemaError::Throttled("rate exceeded".into()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl QueryEngine for MockEngine {
        async fn create_table(&self, columns: Vec<ColumnDef>) -> SchemaResult<()> {
            self.maybe_throttle()?;
            *self.columns.lock().unwrap() = Some(columns);
            Ok(())
        }

        async fn table_columns(&self) -> SchemaResult<Option<Vec<ColumnDef>>> {
            Ok(self.columns.lock().unwrap().clone())
        }

        async fn add_columns(&self, columns: Vec<ColumnDef>) -> SchemaResult<()> {
            *self.add_calls.lock().unwrap() += 1;
            self.maybe_throttle()?;
            if *self.always_exists.lock().unwrap() {
                return Err(SchemaError::AlreadyExists("no new columns".into()));
            }
            let mut existing = self.columns.lock().unwrap();
            let existing = existing.as_mut().ok_or(SchemaError::CatalogMissing)?;
            let before = existing.len();
            for col in columns {
                if !existing.iter().any(|c| c.name == col.name) {
                    existing.push(col);
                }
            }
            if existing.len() == before {
                return Err(SchemaError::AlreadyExists("no new columns".into()));
            }
            Ok(())
        }

        async fn replace_view(&self, _view: &str, sql: &str) -> SchemaResult<()> {
            self.maybe_throttle()?;
            *self.view_sql.lock().unwrap() = Some(sql.to_string());
            Ok(())
        }

        async fn drop_view(&self, _view: &str) -> SchemaResult<()> {
            *self.view_sql.lock().unwrap() = None;
            Ok(())
        }

        async fn start_query(&self, _sql: &str) -> GatewayResult<Uuid> {
            unimplemented!("not a query engine test")
        }

        async fn query_status(&self, _id: Uuid) -> GatewayResult<EngineStatus> {
            unimplemented!("not a query engine test")
        }

        async fn result_rows(
            &self,
            _id: Uuid,
            _offset: usize,
            _limit: usize,
        ) -> GatewayResult<ResultPage> {
            unimplemented!("not a query engine test")
        }

        async fn result_object(&self, _id: Uuid) -> GatewayResult<PathBuf> {
            unimplemented!("not a query engine test")
        }
    }

    fn sync(engine: Arc<MockEngine>) -> SchemaSync {
        SchemaSync::new(engine, "contacts", "contacts_long", "_question", "report_date")
    }

    fn sample() -> Vec<Record> {
        let mut a = Record::new();
        a.insert("ContactId", AttrValue::Str("c1".into()));
        a.insert("nps_score", AttrValue::Num(9.0));
        let mut b = Record::new();
        b.insert("contactid", AttrValue::Str("c2".into()));
        b.insert("NPS_Score", AttrValue::Str("8".into()));
        vec![a, b]
    }

    #[tokio::test]
    async fn test_bootstrap_infers_and_creates() {
        let engine = Arc::new(MockEngine::default());
        let catalog = sync(engine.clone()).bootstrap(&sample()).await.unwrap();

        assert!(catalog.contains("contactid"));
        assert_eq!(
            catalog.get("nps_score").unwrap().column_type,
            ColumnType::Double
        );
        assert!(catalog.contains("report_date"));
        assert!(engine.columns.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_infer_conflict_widens_to_string() {
        let engine = Arc::new(MockEngine::default());
        let mut a = Record::new();
        a.insert("Score", AttrValue::Num(5.0));
        let mut b = Record::new();
        b.insert("score", AttrValue::Str("n/a".into()));

        let columns = sync(engine).infer_columns(&[a, b]);
        let score = columns.iter().find(|c| c.name == "score").unwrap();
        assert_eq!(score.column_type, ColumnType::String);
    }

    #[tokio::test]
    async fn test_reconcile_adds_only_missing() {
        let engine = Arc::new(MockEngine::default());
        let s = sync(engine.clone());
        s.bootstrap(&sample()).await.unwrap();

        let discovered = vec![
            ColumnDef::discovered("contactid", ColumnType::String),
            ColumnDef::discovered("Comment", ColumnType::String),
        ];
        let (catalog, added) = s.reconcile(&discovered).await.unwrap();
        assert_eq!(added, vec!["comment"]);
        assert!(catalog.contains("comment"));

        // A second reconcile of the same batch is a no-op
        let (_, added) = s.reconcile(&discovered).await.unwrap();
        assert!(added.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_before_bootstrap_fails() {
        let engine = Arc::new(MockEngine::default());
        let err = sync(engine)
            .reconcile(&[ColumnDef::discovered("x", ColumnType::String)])
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::CatalogMissing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_ddl_is_retried() {
        let engine = Arc::new(MockEngine::throttling(2));
        let s = sync(engine.clone());
        *engine.columns.lock().unwrap() =
            Some(vec![ColumnDef::discovered("contactid", ColumnType::String)]);

        let discovered = vec![ColumnDef::discovered("comment", ColumnType::String)];
        let (catalog, added) = s.reconcile(&discovered).await.unwrap();
        assert_eq!(added, vec!["comment"]);
        assert!(catalog.contains("comment"));
        assert_eq!(*engine.add_calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_exhausts_attempts() {
        let engine = Arc::new(MockEngine::throttling(10));
        let s = sync(engine.clone());
        *engine.columns.lock().unwrap() =
            Some(vec![ColumnDef::discovered("contactid", ColumnType::String)]);

        let err = s
            .reconcile(&[ColumnDef::discovered("comment", ColumnType::String)])
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Throttled(_)));
    }

    #[tokio::test]
    async fn test_already_exists_is_success() {
        // A concurrent writer added the column between our catalog read and
        // the DDL call; the engine's AlreadyExists must not surface.
        let engine = Arc::new(MockEngine::default());
        let s = sync(engine.clone());
        *engine.columns.lock().unwrap() = Some(vec![
            ColumnDef::discovered("contactid", ColumnType::String),
        ]);
        *engine.always_exists.lock().unwrap() = true;

        let discovered = vec![ColumnDef::discovered("comment", ColumnType::String)];
        let (catalog, added) = s.reconcile(&discovered).await.unwrap();
        assert_eq!(added, vec!["comment"]);
        assert!(catalog.contains("comment"));
    }
}
