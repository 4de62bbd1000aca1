//! DataFusion-backed query engine.
//!
//! Plays the role the managed catalog + SQL service play in a cloud
//! deployment: the schema catalog is persisted as JSON beside the lake,
//! the lake directory is registered as a Hive-partitioned listing table,
//! and each submitted query runs on its own task while callers poll the
//! execution registry. Result sets are written as raw CSV objects under
//! `_results/` so downloads serve exactly what the engine produced.

use crate::error::{GatewayError, GatewayResult, SchemaError, SchemaResult};
use crate::schema::catalog::{Catalog, ColumnDef, PARTITION_COLUMNS};
use crate::schema::infer::ColumnType;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::json::LineDelimitedWriter;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::file_format::parquet::ParquetFormat;
use datafusion::datasource::listing::ListingOptions;
use datafusion::prelude::SessionContext;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineStatus, ExecState, QueryEngine, ResultPage};

const CATALOG_FILE: &str = "_catalog.json";
const RESULTS_DIR: &str = "_results";

/// Persisted catalog document.
#[derive(serde::Serialize, serde::Deserialize)]
struct CatalogDoc {
    table: String,
    columns: Vec<ColumnDef>,
}

/// One tracked query execution. The gateway owns the caller-facing
/// record (including the SQL text); this is only the engine's side.
struct Execution {
    state: ExecState,
    error_message: Option<String>,
    row_count: Option<u64>,
    result_path: Option<PathBuf>,
    columns: Vec<String>,
    rows: Vec<serde_json::Value>,
}

/// Local DataFusion engine over a lake directory.
pub struct LocalEngine {
    ctx: SessionContext,
    lake_dir: PathBuf,
    data_dir: PathBuf,
    results_dir: PathBuf,
    table_name: String,
    executions: Arc<RwLock<HashMap<Uuid, Arc<RwLock<Execution>>>>>,
}

impl LocalEngine {
    /// Open the engine over `lake_dir`, registering the lake table if a
    /// catalog already exists.
    pub async fn open(lake_dir: &Path, prefix: &str, table_name: &str) -> SchemaResult<Self> {
        let data_dir = lake_dir.join(prefix);
        let results_dir = lake_dir.join(RESULTS_DIR);
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(&results_dir)?;

        let engine = Self {
            ctx: SessionContext::new(),
            lake_dir: lake_dir.to_path_buf(),
            data_dir,
            results_dir,
            table_name: table_name.to_string(),
            executions: Arc::new(RwLock::new(HashMap::new())),
        };

        if let Some(catalog) = engine.load_catalog()? {
            engine.register_table(&catalog).await?;
            info!(
                table = %engine.table_name,
                columns = catalog.len(),
                "Registered lake table from existing catalog"
            );
        }

        Ok(engine)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn catalog_path(&self) -> PathBuf {
        self.lake_dir.join(CATALOG_FILE)
    }

    fn load_catalog(&self) -> SchemaResult<Option<Catalog>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let doc: CatalogDoc = serde_json::from_slice(&bytes)?;
        Ok(Some(Catalog::from_columns(doc.columns)))
    }

    fn persist_catalog(&self, catalog: &Catalog) -> SchemaResult<()> {
        let doc = CatalogDoc {
            table: self.table_name.clone(),
            columns: catalog.columns().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        std::fs::write(self.catalog_path(), bytes)?;
        Ok(())
    }

    /// File-level Arrow schema for the catalog's data columns. Partition
    /// columns live in the path, not in the files.
    fn file_schema(catalog: &Catalog) -> SchemaRef {
        let fields: Vec<Field> = catalog
            .columns()
            .map(|col| {
                let dtype = match col.column_type {
                    ColumnType::Double => DataType::Float64,
                    ColumnType::String => DataType::Utf8,
                };
                Field::new(&col.name, dtype, true)
            })
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// (Re)register the lake table from a catalog snapshot.
    async fn register_table(&self, catalog: &Catalog) -> SchemaResult<()> {
        let _ = self.ctx.deregister_table(self.table_name.as_str());

        let partition_cols: Vec<(String, DataType)> = PARTITION_COLUMNS
            .iter()
            .map(|name| (name.to_string(), DataType::Int32))
            .collect();

        let options = ListingOptions::new(Arc::new(ParquetFormat::default()))
            .with_file_extension(".parquet")
            .with_table_partition_cols(partition_cols);

        let table_path = format!("{}/", self.data_dir.display());
        self.ctx
            .register_listing_table(
                self.table_name.as_str(),
                &table_path,
                options,
                Some(Self::file_schema(catalog)),
                None,
            )
            .await
            .map_err(|e| SchemaError::Engine(e.to_string()))?;

        Ok(())
    }

    async fn execution(&self, id: Uuid) -> GatewayResult<Arc<RwLock<Execution>>> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GatewayError::UnknownExecution(id))
    }

    /// Run one query to completion, recording the outcome.
    async fn run_query(
        ctx: SessionContext,
        sql: String,
        csv_path: PathBuf,
        exec: Arc<RwLock<Execution>>,
    ) {
        exec.write().await.state = ExecState::Running;

        let collected = match ctx.sql(&sql).await {
            Ok(df) => df.collect().await,
            Err(e) => Err(e),
        };

        match collected {
            Ok(batches) => {
                let row_count: usize = batches.iter().map(|b| b.num_rows()).sum();
                let columns: Vec<String> = batches
                    .first()
                    .map(|b| b.schema().fields().iter().map(|f| f.name().clone()).collect())
                    .unwrap_or_default();

                let rows = match batches_to_json(&batches) {
                    Ok(rows) => rows,
                    Err(e) => {
                        let mut guard = exec.write().await;
                        guard.state = ExecState::Failed;
                        guard.error_message = Some(e.to_string());
                        return;
                    }
                };

                if let Err(e) = write_result_csv(&csv_path, &batches) {
                    let mut guard = exec.write().await;
                    guard.state = ExecState::Failed;
                    guard.error_message = Some(e.to_string());
                    return;
                }

                let mut guard = exec.write().await;
                guard.state = ExecState::Succeeded;
                guard.row_count = Some(row_count as u64);
                guard.result_path = Some(csv_path);
                guard.columns = columns;
                guard.rows = rows;
                debug!(rows = row_count, "Query succeeded");
            }
            Err(e) => {
                let mut guard = exec.write().await;
                guard.state = ExecState::Failed;
                guard.error_message = Some(e.to_string());
                warn!(error = %e, "Query failed");
            }
        }
    }
}

#[async_trait]
impl QueryEngine for LocalEngine {
    async fn create_table(&self, columns: Vec<ColumnDef>) -> SchemaResult<()> {
        let catalog = Catalog::from_columns(columns);
        self.persist_catalog(&catalog)?;
        self.register_table(&catalog).await?;
        info!(table = %self.table_name, columns = catalog.len(), "Created catalog");
        Ok(())
    }

    async fn table_columns(&self) -> SchemaResult<Option<Vec<ColumnDef>>> {
        Ok(self
            .load_catalog()?
            .map(|c| c.columns().cloned().collect()))
    }

    async fn add_columns(&self, columns: Vec<ColumnDef>) -> SchemaResult<()> {
        let mut catalog = self.load_catalog()?.ok_or(SchemaError::CatalogMissing)?;
        let added = catalog.merge_columns(columns);
        if added.is_empty() {
            return Err(SchemaError::AlreadyExists(
                "all requested columns already present".to_string(),
            ));
        }
        self.persist_catalog(&catalog)?;
        self.register_table(&catalog).await?;
        info!(
            added = added.len(),
            names = ?added.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Added columns to catalog"
        );
        Ok(())
    }

    async fn replace_view(&self, view: &str, sql: &str) -> SchemaResult<()> {
        let _ = self.ctx.deregister_table(view);
        self.ctx
            .sql(sql)
            .await
            .map_err(|e| SchemaError::Engine(e.to_string()))?;
        debug!(view, "Recreated view");
        Ok(())
    }

    async fn drop_view(&self, view: &str) -> SchemaResult<()> {
        let _ = self.ctx.deregister_table(view);
        Ok(())
    }

    async fn start_query(&self, sql: &str) -> GatewayResult<Uuid> {
        let id = Uuid::new_v4();
        let exec = Arc::new(RwLock::new(Execution {
            state: ExecState::Submitted,
            error_message: None,
            row_count: None,
            result_path: None,
            columns: Vec::new(),
            rows: Vec::new(),
        }));

        self.executions.write().await.insert(id, exec.clone());

        let ctx = self.ctx.clone();
        let csv_path = self.results_dir.join(format!("{id}.csv"));
        let sql = sql.to_string();
        tokio::spawn(Self::run_query(ctx, sql, csv_path, exec));

        Ok(id)
    }

    async fn query_status(&self, id: Uuid) -> GatewayResult<EngineStatus> {
        let exec = self.execution(id).await?;
        let guard = exec.read().await;
        Ok(EngineStatus {
            state: guard.state,
            error_message: guard.error_message.clone(),
            row_count: guard.row_count,
            result_location: guard
                .result_path
                .as_ref()
                .map(|p| p.display().to_string()),
        })
    }

    async fn result_rows(
        &self,
        id: Uuid,
        offset: usize,
        limit: usize,
    ) -> GatewayResult<ResultPage> {
        let exec = self.execution(id).await?;
        let guard = exec.read().await;
        match guard.state {
            ExecState::Succeeded => {
                let total = guard.rows.len();
                let start = offset.min(total);
                let end = (start + limit).min(total);
                Ok(ResultPage {
                    columns: guard.columns.clone(),
                    rows: guard.rows[start..end].to_vec(),
                    has_more: end < total,
                })
            }
            ExecState::Failed => Err(GatewayError::QueryFailed(
                guard
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown engine error".to_string()),
            )),
            state => Err(GatewayError::NotReady {
                id,
                state: state.to_string(),
            }),
        }
    }

    async fn result_object(&self, id: Uuid) -> GatewayResult<PathBuf> {
        let exec = self.execution(id).await?;
        let guard = exec.read().await;
        match (&guard.state, &guard.result_path) {
            (ExecState::Succeeded, Some(path)) => Ok(path.clone()),
            (ExecState::Failed, _) => Err(GatewayError::QueryFailed(
                guard
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown engine error".to_string()),
            )),
            (state, _) => Err(GatewayError::NotReady {
                id,
                state: state.to_string(),
            }),
        }
    }
}

/// Convert Arrow RecordBatches to JSON rows using Arrow's JSON writer.
fn batches_to_json(batches: &[RecordBatch]) -> Result<Vec<serde_json::Value>, GatewayError> {
    if batches.is_empty() {
        return Ok(vec![]);
    }

    let mut buf = Vec::new();
    {
        let mut writer = LineDelimitedWriter::new(&mut buf);
        for batch in batches {
            writer
                .write(batch)
                .map_err(|e| GatewayError::Engine(e.to_string()))?;
        }
        writer
            .finish()
            .map_err(|e| GatewayError::Engine(e.to_string()))?;
    }

    let output = String::from_utf8_lossy(&buf);
    let rows: Vec<serde_json::Value> = output
        .lines()
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Write the raw CSV result object.
fn write_result_csv(path: &Path, batches: &[RecordBatch]) -> Result<(), GatewayError> {
    let file = std::fs::File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| GatewayError::Engine(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer::ColumnType;
    use arrow::array::{Float64Array, StringArray};
    use tempfile::tempdir;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::discovered("contactid", ColumnType::String),
            ColumnDef::discovered("nps_score", ColumnType::Double),
        ]
    }

    #[tokio::test]
    async fn test_catalog_lifecycle() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::open(dir.path(), "exports", "contacts")
            .await
            .unwrap();

        assert!(engine.table_columns().await.unwrap().is_none());

        engine.create_table(columns()).await.unwrap();
        let cols = engine.table_columns().await.unwrap().unwrap();
        assert_eq!(cols.len(), 2);

        // Adding a new column grows the catalog
        engine
            .add_columns(vec![ColumnDef::discovered("agent", ColumnType::String)])
            .await
            .unwrap();
        let cols = engine.table_columns().await.unwrap().unwrap();
        assert_eq!(cols.len(), 3);

        // Re-adding the same column reports AlreadyExists
        let err = engine
            .add_columns(vec![ColumnDef::discovered("agent", ColumnType::String)])
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_add_columns_without_catalog() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::open(dir.path(), "exports", "contacts")
            .await
            .unwrap();
        let err = engine.add_columns(columns()).await.unwrap_err();
        assert!(matches!(err, SchemaError::CatalogMissing));
    }

    #[tokio::test]
    async fn test_query_lifecycle_success() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::open(dir.path(), "exports", "contacts")
            .await
            .unwrap();

        let id = engine.start_query("SELECT 1 AS one").await.unwrap();

        // Poll until terminal
        let mut status = engine.query_status(id).await.unwrap();
        for _ in 0..100 {
            if status.state.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = engine.query_status(id).await.unwrap();
        }

        assert_eq!(status.state, ExecState::Succeeded);
        assert_eq!(status.row_count, Some(1));

        let page = engine.result_rows(id, 0, 10).await.unwrap();
        assert_eq!(page.columns, vec!["one"]);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0]["one"], 1);
        assert!(!page.has_more);

        let csv = engine.result_object(id).await.unwrap();
        let content = std::fs::read_to_string(csv).unwrap();
        assert!(content.starts_with("one"));
    }

    #[tokio::test]
    async fn test_query_lifecycle_failure() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::open(dir.path(), "exports", "contacts")
            .await
            .unwrap();

        let id = engine
            .start_query("SELECT * FROM table_that_does_not_exist")
            .await
            .unwrap();

        let mut status = engine.query_status(id).await.unwrap();
        for _ in 0..100 {
            if status.state.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = engine.query_status(id).await.unwrap();
        }

        assert_eq!(status.state, ExecState::Failed);
        assert!(status.error_message.is_some());

        let err = engine.result_rows(id, 0, 10).await.unwrap_err();
        assert!(matches!(err, GatewayError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::open(dir.path(), "exports", "contacts")
            .await
            .unwrap();
        let err = engine.query_status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownExecution(_)));
    }

    #[test]
    fn test_batches_to_json() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("score", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["alpha", "beta"])),
                Arc::new(Float64Array::from(vec![1.5, 2.5])),
            ],
        )
        .unwrap();

        let rows = batches_to_json(&[batch]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "alpha");
        assert_eq!(rows[1]["score"], 2.5);
    }
}
