//! Named query catalog for the gateway.
//!
//! Callers pick queries by name and supply a small set of validated
//! parameters; only `custom_sql` accepts raw SQL, and that still goes
//! through the gateway's SELECT gate. Parameters are validated here so
//! nothing caller-controlled is ever spliced into SQL unchecked.

use crate::error::{GatewayError, GatewayResult};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Table and view names the builders target.
#[derive(Debug, Clone)]
pub struct QueryNames {
    pub table: String,
    pub view: String,
    /// Derived canonical date column (`YYYY-MM-DD` strings)
    pub date_column: String,
}

/// A parsed, parameter-validated query request.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedQuery {
    /// Row and distinct-entity counts over the whole table
    Stats,
    /// Per-day record counts, optionally bounded by `[from, to]`
    Daily {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// Record counts per channel
    Channels,
    /// Record counts per agent, busiest first
    Agents { limit: usize },
    /// Response counts per survey topic, from the unpivot view
    Topics,
    /// Caller-supplied SQL (still subject to the SELECT gate)
    CustomSql(String),
}

const DEFAULT_AGENT_LIMIT: usize = 25;
const MAX_AGENT_LIMIT: usize = 1000;

impl NamedQuery {
    /// Parse a request into a query. `sql` is only honored for
    /// `custom_sql`; anything else carrying raw SQL is rejected.
    pub fn parse(
        query: &str,
        params: &HashMap<String, String>,
        sql: Option<&str>,
    ) -> GatewayResult<Self> {
        match query {
            "stats" => Ok(NamedQuery::Stats),
            "daily" => Ok(NamedQuery::Daily {
                from: parse_date_param(params, "from")?,
                to: parse_date_param(params, "to")?,
            }),
            "channels" => Ok(NamedQuery::Channels),
            "agents" => Ok(NamedQuery::Agents {
                limit: parse_limit_param(params, "limit")?,
            }),
            "topics" => Ok(NamedQuery::Topics),
            "custom_sql" => {
                let sql = sql.ok_or_else(|| GatewayError::InvalidParameter {
                    name: "sql".to_string(),
                    reason: "custom_sql requires a sql body".to_string(),
                })?;
                Ok(NamedQuery::CustomSql(sql.to_string()))
            }
            other => Err(GatewayError::UnknownQueryType(other.to_string())),
        }
    }

    /// Render the query as SQL against the configured names.
    pub fn to_sql(&self, names: &QueryNames) -> String {
        match self {
            NamedQuery::Stats => format!(
                "SELECT COUNT(*) AS total_rows, \
                 COUNT(DISTINCT contactid) AS unique_contacts, \
                 COUNT(DISTINCT channel) AS channels, \
                 COUNT(DISTINCT agent) AS agents \
                 FROM {}",
                names.table
            ),
            NamedQuery::Daily { from, to } => {
                let mut clauses = Vec::new();
                if let Some(from) = from {
                    clauses.push(format!("\"{}\" >= '{}'", names.date_column, from));
                }
                if let Some(to) = to {
                    clauses.push(format!("\"{}\" <= '{}'", names.date_column, to));
                }
                let filter = if clauses.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {}", clauses.join(" AND "))
                };
                format!(
                    "SELECT \"{col}\" AS date, COUNT(*) AS count FROM {table}{filter} \
                     GROUP BY \"{col}\" ORDER BY \"{col}\"",
                    col = names.date_column,
                    table = names.table,
                    filter = filter,
                )
            }
            NamedQuery::Channels => format!(
                "SELECT channel, COUNT(*) AS count FROM {} \
                 GROUP BY channel ORDER BY count DESC",
                names.table
            ),
            NamedQuery::Agents { limit } => format!(
                "SELECT agent, COUNT(*) AS count FROM {} \
                 GROUP BY agent ORDER BY count DESC LIMIT {}",
                names.table, limit
            ),
            NamedQuery::Topics => format!(
                "SELECT topic, COUNT(*) AS responses FROM {} \
                 GROUP BY topic ORDER BY responses DESC",
                names.view
            ),
            NamedQuery::CustomSql(sql) => sql.clone(),
        }
    }
}

/// Parse an optional `YYYY-MM-DD` parameter.
fn parse_date_param(
    params: &HashMap<String, String>,
    name: &str,
) -> GatewayResult<Option<NaiveDate>> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| GatewayError::InvalidParameter {
                name: name.to_string(),
                reason: format!("'{raw}' is not a YYYY-MM-DD date"),
            }),
    }
}

/// Parse an optional positive integer limit, bounded above.
fn parse_limit_param(params: &HashMap<String, String>, name: &str) -> GatewayResult<usize> {
    match params.get(name) {
        None => Ok(DEFAULT_AGENT_LIMIT),
        Some(raw) => {
            let limit: usize =
                raw.trim()
                    .parse()
                    .map_err(|_| GatewayError::InvalidParameter {
                        name: name.to_string(),
                        reason: format!("'{raw}' is not a positive integer"),
                    })?;
            if limit == 0 || limit > MAX_AGENT_LIMIT {
                return Err(GatewayError::InvalidParameter {
                    name: name.to_string(),
                    reason: format!("must be between 1 and {MAX_AGENT_LIMIT}"),
                });
            }
            Ok(limit)
        }
    }
}
