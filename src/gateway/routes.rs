//! Axum HTTP routes for the query gateway.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::executor::{QueryGateway, RunOutcome};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub gateway: QueryGateway,
}

const DASHBOARD: &str = include_str!("dashboard.html");

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/query", post(submit_query))
        .route("/results", get(results))
        .route("/download", get(download))
        .route("/files/:name", get(result_file))
        .route("/daily", get(daily));

    Router::new()
        .route("/", get(dashboard))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn dashboard() -> impl IntoResponse {
    Html(DASHBOARD)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "contact-lake-gateway",
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GatewayError> {
    match state.gateway.stats().await? {
        Some(summary) => Ok(Json(serde_json::json!(summary)).into_response()),
        None => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "state": "INDETERMINATE" })),
        )
            .into_response()),
    }
}

/// Request body for submitting a query
#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    params: HashMap<String, String>,
    sql: Option<String>,
}

async fn submit_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = state
        .gateway
        .submit_named(&body.query, &body.params, body.sql.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "queryExecutionId": id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsParams {
    query_execution_id: Uuid,
    #[serde(default)]
    offset: usize,
    max_rows: Option<usize>,
}

async fn results(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResultsParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = params.query_execution_id;
    let status = state.gateway.poll(id).await?;

    if status.state == crate::engine::ExecState::Succeeded {
        let page = state
            .gateway
            .fetch_rows(id, params.offset, params.max_rows.unwrap_or(usize::MAX))
            .await?;
        return Ok(Json(serde_json::json!({
            "state": status.state,
            "columns": page.columns,
            "rows": page.rows,
            "hasMore": page.has_more,
        })));
    }
    if status.state == crate::engine::ExecState::Failed {
        return Err(GatewayError::QueryFailed(
            status
                .error_message
                .unwrap_or_else(|| "unknown engine error".to_string()),
        ));
    }

    // Still in flight: report the state, caller polls again
    Ok(Json(serde_json::json!({
        "state": status.state,
        "columns": [],
        "rows": [],
        "hasMore": false,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadParams {
    query_execution_id: Uuid,
}

async fn download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let url = state
        .gateway
        .presigned_download(params.query_execution_id, Utc::now())
        .await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]))
}

#[derive(Deserialize)]
struct FileParams {
    expires: i64,
}

async fn result_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<FileParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let id = parse_csv_name(&name)?;
    let path = state
        .gateway
        .result_file(id, params.expires, Utc::now())
        .await?;
    let body = tokio::fs::read(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        body,
    ))
}

#[derive(Deserialize)]
struct DailyParams {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn daily(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyParams>,
) -> Result<impl IntoResponse, GatewayError> {
    match state.gateway.daily_counts(params.from, params.to).await? {
        Some(counts) => Ok(Json(serde_json::json!(counts)).into_response()),
        None => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "state": "INDETERMINATE" })),
        )
            .into_response()),
    }
}

/// Extract the execution id from a `<uuid>.csv` file name.
fn parse_csv_name(name: &str) -> GatewayResult<Uuid> {
    name.strip_suffix(".csv")
        .and_then(|stem| Uuid::parse_str(stem).ok())
        .ok_or_else(|| GatewayError::InvalidParameter {
            name: "name".to_string(),
            reason: "expected <uuid>.csv".to_string(),
        })
}

// ─── Server startup ──────────────────────────────────────────────

/// Start the gateway server.
pub async fn serve(state: Arc<AppState>, bind: &str, port: u16) -> GatewayResult<()> {
    let router = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| GatewayError::InvalidParameter {
            name: "bind".to_string(),
            reason: format!("invalid bind address: {e}"),
        })?;

    info!("Gateway listening on http://{addr}");
    info!("  GET  /api/health");
    info!("  GET  /api/stats");
    info!("  POST /api/query");
    info!("  GET  /api/results");
    info!("  GET  /api/download");
    info!("  GET  /api/files/:name");
    info!("  GET  /api/daily");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Shutting down gracefully");
}
