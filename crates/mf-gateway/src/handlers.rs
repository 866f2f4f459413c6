//! HTTP request handlers for the metrics API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use mf_ingest::{MetricSample, Receipt, ReferenceLink, SearchBackend};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

/// Path parameters of a single write that names its task.
#[derive(Debug, Deserialize)]
pub struct TaskPath {
    /// Workflow identifier.
    pub workflow: String,
    /// Task identifier.
    pub task: String,
    /// Experiment identifier.
    pub experiment: String,
}

/// Path parameters of a single write without a task segment.
#[derive(Debug, Deserialize)]
pub struct ExperimentPath {
    /// Workflow identifier.
    pub workflow: String,
    /// Experiment identifier.
    pub experiment: String,
}

/// Optional query of a single write.
#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    /// Task identifier.
    pub task: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Crate version.
    pub version: &'static str,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Handle GET /health - health check endpoint.
pub async fn health_check<B: SearchBackend>(
    State(state): State<Arc<GatewayState<B>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

/// Handle POST /v1/mf/metrics - bulk write.
///
/// Responds with one reference link per record, in request order.
pub async fn ingest_bulk<B: SearchBackend>(
    State(state): State<Arc<GatewayState<B>>>,
    body: Bytes,
) -> GatewayResult<Json<Vec<ReferenceLink>>> {
    let Value::Array(records) = parse_json(&body)? else {
        return Err(GatewayError::InvalidRequest(
            "bulk body must be a JSON array".to_string(),
        ));
    };
    debug!(count = records.len(), "bulk request");

    let receipts = state.ingestor().ingest_records(records).await?;
    Ok(Json(receipts.into_iter().map(|r| r.link).collect()))
}

/// Handle POST /v1/mf/metrics/{workflow}/{task}/{experiment} - single write.
pub async fn ingest_with_task<B: SearchBackend>(
    State(state): State<Arc<GatewayState<B>>>,
    Path(path): Path<TaskPath>,
    body: Bytes,
) -> GatewayResult<Json<Receipt>> {
    ingest_single(
        &state,
        &path.workflow,
        Some(path.task.as_str()),
        &path.experiment,
        &body,
    )
    .await
}

/// Handle POST /v1/mf/metrics/{workflow}/{experiment} - single write, task
/// taken from the optional `task` query parameter.
pub async fn ingest_without_task<B: SearchBackend>(
    State(state): State<Arc<GatewayState<B>>>,
    Path(path): Path<ExperimentPath>,
    Query(query): Query<TaskQuery>,
    body: Bytes,
) -> GatewayResult<Json<Receipt>> {
    ingest_single(
        &state,
        &path.workflow,
        query.task.as_deref(),
        &path.experiment,
        &body,
    )
    .await
}

async fn ingest_single<B: SearchBackend>(
    state: &GatewayState<B>,
    workflow: &str,
    task: Option<&str>,
    experiment: &str,
    body: &[u8],
) -> GatewayResult<Json<Receipt>> {
    let sample = MetricSample::from_body(workflow, task, experiment, parse_json(body)?)?;
    let receipt = state.ingestor().ingest_one(sample).await?;
    Ok(Json(receipt))
}

fn parse_json(body: &[u8]) -> GatewayResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed JSON body: {e}")))
}
