//! Query gateway: validation, submission, polling, and result access.
//!
//! The gateway is the only path SQL takes to the engine. Its single
//! validation rule is that statements must be SELECTs; everything else in
//! the request surface is named queries with checked parameters. Query
//! executions are asynchronous: callers poll until a terminal state, and
//! a caller that exhausts its poll budget gets `Indeterminate` back (the
//! execution may still finish; it is a state, not an error).

use crate::engine::{EngineStatus, ExecState, QueryEngine, ResultPage};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::queries::{NamedQuery, QueryNames};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub names: QueryNames,
    /// Hard cap on rows per fetch, whatever the caller asks for
    pub max_fetch_rows: usize,
    /// Lifetime of download URLs
    pub download_ttl: Duration,
    /// Wall-clock budget for internal poll loops
    pub poll_budget: Duration,
}

/// Outcome of driving a query to completion under a poll budget.
#[derive(Debug)]
pub enum RunOutcome {
    Complete(ResultPage),
    /// Budget exhausted before the execution reached a terminal state
    Indeterminate,
}

/// Whole-table summary counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_rows: u64,
    pub unique_contacts: u64,
    pub channels: u64,
    pub agents: u64,
}

/// One day's record count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

/// The SQL front door.
pub struct QueryGateway {
    engine: Arc<dyn QueryEngine>,
    options: GatewayOptions,
}

impl QueryGateway {
    pub fn new(engine: Arc<dyn QueryEngine>, options: GatewayOptions) -> Self {
        Self { engine, options }
    }

    pub fn names(&self) -> &QueryNames {
        &self.options.names
    }

    /// The sole SQL gate: trimmed, case-insensitive SELECT prefix.
    pub fn validate(sql: &str) -> GatewayResult<()> {
        let trimmed = sql.trim_start();
        if trimmed.len() >= 6 && trimmed[..6].eq_ignore_ascii_case("select") {
            Ok(())
        } else {
            Err(GatewayError::RejectedQuery)
        }
    }

    /// Validate and hand SQL to the engine; the returned execution starts
    /// in SUBMITTED.
    pub async fn submit(&self, sql: &str) -> GatewayResult<Uuid> {
        Self::validate(sql)?;
        let id = self.engine.start_query(sql).await?;
        info!(%id, "Submitted query");
        Ok(id)
    }

    /// Parse a named query request and submit it.
    pub async fn submit_named(
        &self,
        query: &str,
        params: &std::collections::HashMap<String, String>,
        sql: Option<&str>,
    ) -> GatewayResult<Uuid> {
        let named = NamedQuery::parse(query, params, sql)?;
        self.submit(&named.to_sql(&self.options.names)).await
    }

    /// Refresh an execution's state from the engine.
    pub async fn poll(&self, id: Uuid) -> GatewayResult<EngineStatus> {
        self.engine.query_status(id).await
    }

    /// Fetch a page of result rows. The caller's `max_rows` is clamped to
    /// the configured ceiling.
    pub async fn fetch_rows(
        &self,
        id: Uuid,
        offset: usize,
        max_rows: usize,
    ) -> GatewayResult<ResultPage> {
        let limit = max_rows.min(self.options.max_fetch_rows).max(1);
        self.engine.result_rows(id, offset, limit).await
    }

    /// Time-limited relative URL for the raw CSV result object. SUCCEEDED
    /// executions only.
    pub async fn presigned_download(&self, id: Uuid, now: DateTime<Utc>) -> GatewayResult<String> {
        let status = self.poll(id).await?;
        match status.state {
            ExecState::Succeeded => {
                let expires = now.timestamp() + self.options.download_ttl.as_secs() as i64;
                Ok(format!("/api/files/{id}.csv?expires={expires}"))
            }
            ExecState::Failed => Err(GatewayError::QueryFailed(
                status
                    .error_message
                    .unwrap_or_else(|| "unknown engine error".to_string()),
            )),
            state => Err(GatewayError::NotReady {
                id,
                state: state.to_string(),
            }),
        }
    }

    /// Resolve a download URL back to the CSV path, enforcing expiry.
    pub async fn result_file(
        &self,
        id: Uuid,
        expires: i64,
        now: DateTime<Utc>,
    ) -> GatewayResult<PathBuf> {
        if now.timestamp() > expires {
            return Err(GatewayError::Expired);
        }
        self.engine.result_object(id).await
    }

    /// Poll until the execution is terminal or the budget runs out.
    pub async fn poll_until_terminal(
        &self,
        id: Uuid,
        budget: Duration,
    ) -> GatewayResult<Option<EngineStatus>> {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let status = self.poll(id).await?;
            if status.state.is_terminal() {
                return Ok(Some(status));
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(%id, "Poll budget exhausted");
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Submit a named query and drive it to completion in one call.
    pub async fn run_named(
        &self,
        query: &str,
        params: &std::collections::HashMap<String, String>,
        sql: Option<&str>,
    ) -> GatewayResult<RunOutcome> {
        let id = self.submit_named(query, params, sql).await?;
        match self.poll_until_terminal(id, self.options.poll_budget).await? {
            None => Ok(RunOutcome::Indeterminate),
            Some(status) => match status.state {
                ExecState::Succeeded => {
                    let page = self
                        .fetch_rows(id, 0, self.options.max_fetch_rows)
                        .await?;
                    Ok(RunOutcome::Complete(page))
                }
                ExecState::Failed => Err(GatewayError::QueryFailed(
                    status
                        .error_message
                        .unwrap_or_else(|| "unknown engine error".to_string()),
                )),
                state => Err(GatewayError::NotReady {
                    id,
                    state: state.to_string(),
                }),
            },
        }
    }

    /// Whole-table stats, or None when the poll budget runs out.
    pub async fn stats(&self) -> GatewayResult<Option<StatsSummary>> {
        let outcome = self
            .run_named("stats", &std::collections::HashMap::new(), None)
            .await?;
        let page = match outcome {
            RunOutcome::Complete(page) => page,
            RunOutcome::Indeterminate => return Ok(None),
        };
        let row = page.rows.first().cloned().unwrap_or(serde_json::Value::Null);
        Ok(Some(StatsSummary {
            total_rows: count_field(&row, "total_rows"),
            unique_contacts: count_field(&row, "unique_contacts"),
            channels: count_field(&row, "channels"),
            agents: count_field(&row, "agents"),
        }))
    }

    /// Per-day record counts over the derived date column, ascending.
    pub async fn daily_counts(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> GatewayResult<Option<Vec<DailyCount>>> {
        let sql = NamedQuery::Daily { from, to }.to_sql(&self.options.names);
        let id = self.submit(&sql).await?;
        match self.poll_until_terminal(id, self.options.poll_budget).await? {
            None => Ok(None),
            Some(status) if status.state == ExecState::Succeeded => {
                let page = self.fetch_rows(id, 0, self.options.max_fetch_rows).await?;
                let counts = page
                    .rows
                    .iter()
                    .map(|row| DailyCount {
                        date: row["date"].as_str().unwrap_or_default().to_string(),
                        count: count_field(row, "count"),
                    })
                    .collect();
                Ok(Some(counts))
            }
            Some(status) => Err(GatewayError::QueryFailed(
                status
                    .error_message
                    .unwrap_or_else(|| "unknown engine error".to_string()),
            )),
        }
    }
}

fn count_field(row: &serde_json::Value, name: &str) -> u64 {
    row.get(name).and_then(|v| v.as_u64()).unwrap_or(0)
}
