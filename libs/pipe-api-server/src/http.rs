use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use pipe_api::{PollRecord, RecordSummary};

use super::{ApiError, AppState};

/// Роль этого процесса в топологии.
const ROLE: &str = "CLOUD";

const STATUS_RECENT: usize = 100;

// ═══════════════════════════════════════════════════════════════
//  GET /pipe/poll?offset=N
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub(crate) struct PollParams {
    offset: Option<String>,
}

/// Offset разбирается вручную: на мусор, отрицательные значения и
/// повторённый параметр нужен JSON 400, а не текстовый ответ `Query` extractor'а.
fn parse_offset(raw: Option<&str>) -> Result<i64, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(s) => s,
    };
    let offset: i64 = raw
        .parse()
        .map_err(|_| ApiError::invalid(format!("offset must be an integer, got '{raw}'")))?;
    if offset < 0 {
        return Err(ApiError::invalid(format!("offset must be non-negative, got {offset}")));
    }
    Ok(offset)
}

pub(crate) async fn handle_poll(
    State(state): State<AppState>,
    query: Result<Query<PollParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|e| ApiError::invalid(e.body_text()))?;
    let offset = parse_offset(params.offset.as_deref())?;
    tracing::debug!(offset, "poll");

    let records = state.reader.read_after(offset).await?;
    if records.is_empty() {
        tracing::debug!(offset, "no new data");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<PollRecord> = records.into_iter().map(PollRecord::from).collect();
    Ok(Json(body).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  GET /health, GET /status
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse<'a> {
    status: &'static str,
    role: &'static str,
    mode: &'a str,
    total_messages: u64,
}

pub(crate) async fn handle_health(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.store.stats().await?;
    Ok(Json(HealthResponse {
        status: "healthy",
        role: ROLE,
        mode: &state.info.mode,
        total_messages: stats.total_records,
    })
    .into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse<'a> {
    role: &'static str,
    mode: &'a str,
    total_messages: u64,
    last_offset: Option<i64>,
    recent_messages: Vec<RecordSummary>,
    showing: String,
}

pub(crate) async fn handle_status(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.store.stats().await?;
    let recent = state.store.recent(STATUS_RECENT).await?;
    Ok(Json(StatusResponse {
        role: ROLE,
        mode: &state.info.mode,
        total_messages: stats.total_records,
        last_offset: stats.max_offset,
        recent_messages: recent,
        showing: format!("last {STATUS_RECENT} messages"),
    })
    .into_response())
}

// ═══════════════════════════════════════════════════════════════
//  GET /registry/topology?nodeId=X
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TopologyParams {
    node_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TopologyResponse<'a> {
    node_id: String,
    role: &'a str,
    request_to_follow: Vec<&'a str>,
    cloud_data_url: &'a str,
    cloud_data_url_fallback: Option<&'a str>,
    topology_version: &'a str,
    topics: &'a [String],
}

pub(crate) async fn handle_topology(
    State(state): State<AppState>,
    Query(params): Query<TopologyParams>,
) -> impl IntoResponse {
    let node_id = params.node_id.unwrap_or_else(|| "unknown".into());
    tracing::info!(node_id = %node_id, "topology request");

    let topology = &state.info.topology;
    Json(TopologyResponse {
        node_id,
        role: &topology.role,
        request_to_follow: vec![topology.cloud_data_url.as_str()],
        cloud_data_url: &topology.cloud_data_url,
        cloud_data_url_fallback: None,
        topology_version: &topology.version,
        topics: &topology.topics,
    })
    .into_response()
}
