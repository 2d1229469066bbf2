//! REST handlers. Every answer is an envelope: `payload` on success,
//! `error` otherwise.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::error::ApiError;
use super::extract::{A2wJson, A2wQuery};
use crate::app::runtime::DEFAULT_LOG_PAGE;
use crate::app::{AgentRuntime, InterruptRequest, Submission, WeightUpdate};
use crate::domain::{A2wError, Envelope, ErrorCode, Message, Severity, TaskContext, TaskId};

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub task_id: TaskId,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub cursor: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LOG_PAGE
}

/// Body of `POST /insights`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRequest {
    pub task_id: TaskId,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

type ApiResult = Result<Response, ApiError>;

fn reply(runtime: &AgentRuntime, status: StatusCode, body: impl Serialize) -> ApiResult {
    let payload = serde_json::to_value(body).map_err(|e| {
        ApiError::new(runtime, &A2wError::Internal(format!("encode response: {e}")))
    })?;
    let envelope = Envelope::encode(runtime.agent_id(), Message::Payload(payload));
    Ok((status, Json(envelope)).into_response())
}

pub async fn manifest(State(runtime): State<AgentRuntime>) -> ApiResult {
    reply(&runtime, StatusCode::OK, runtime.manifest())
}

pub async fn capabilities(State(runtime): State<AgentRuntime>) -> ApiResult {
    reply(
        &runtime,
        StatusCode::OK,
        json!({ "abilities": runtime.capabilities() }),
    )
}

pub async fn start(
    State(runtime): State<AgentRuntime>,
    A2wJson(context): A2wJson<TaskContext>,
) -> ApiResult {
    let task_id = context.task_id.clone();
    let submission = runtime
        .start(context)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&task_id)))?;
    let (status, outcome) = match &submission {
        Submission::Accepted(_) => (StatusCode::ACCEPTED, "accepted"),
        Submission::Existing(_) => (StatusCode::OK, "existing"),
    };
    reply(
        &runtime,
        status,
        json!({ "outcome": outcome, "handle": submission.handle() }),
    )
}

pub async fn status(
    State(runtime): State<AgentRuntime>,
    A2wQuery(query): A2wQuery<TaskQuery>,
) -> ApiResult {
    let snapshot = runtime
        .status(&query.task_id)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&query.task_id)))?;
    reply(&runtime, StatusCode::OK, snapshot)
}

pub async fn stop(
    State(runtime): State<AgentRuntime>,
    A2wJson(request): A2wJson<InterruptRequest>,
) -> ApiResult {
    let task_id = request.task_id.clone();
    let ack = runtime
        .stop(request)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&task_id)))?;
    let status = if ack.pending {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    reply(&runtime, status, ack)
}

pub async fn terminate(
    State(runtime): State<AgentRuntime>,
    A2wJson(request): A2wJson<InterruptRequest>,
) -> ApiResult {
    let task_id = request.task_id.clone();
    let transition = runtime
        .terminate(request)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&task_id)))?;
    reply(&runtime, StatusCode::OK, transition)
}

pub async fn report(
    State(runtime): State<AgentRuntime>,
    A2wQuery(query): A2wQuery<TaskQuery>,
) -> ApiResult {
    let report = runtime
        .report(&query.task_id)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&query.task_id)))?;
    reply(&runtime, StatusCode::OK, report)
}

pub async fn logs(
    State(runtime): State<AgentRuntime>,
    A2wQuery(query): A2wQuery<LogsQuery>,
) -> ApiResult {
    let page = runtime
        .logs(query.cursor, query.limit)
        .await
        .map_err(|e| ApiError::new(&runtime, &e))?;
    reply(&runtime, StatusCode::OK, page)
}

pub async fn insights(
    State(runtime): State<AgentRuntime>,
    A2wJson(request): A2wJson<InsightRequest>,
) -> ApiResult {
    let ack = runtime
        .provide_insight(&request.task_id, request.payload, request.rating)
        .await
        .map_err(|e| ApiError::for_task(&runtime, &e, Some(&request.task_id)))?;
    reply(&runtime, StatusCode::OK, ack)
}

pub async fn weight(
    State(runtime): State<AgentRuntime>,
    A2wJson(update): A2wJson<WeightUpdate>,
) -> ApiResult {
    let change = runtime
        .update_weight(update)
        .map_err(|e| ApiError::new(&runtime, &e))?;
    reply(&runtime, StatusCode::OK, change)
}

pub async fn not_found(State(runtime): State<AgentRuntime>, uri: Uri) -> ApiError {
    let envelope = runtime.reporter().report(
        ErrorCode::InvalidInput,
        StatusCode::NOT_FOUND.as_u16(),
        Severity::Warning,
        true,
        format!("no A2W endpoint at {}", uri.path()),
        json!({ "path": uri.path() }),
    );
    ApiError::from_envelope(StatusCode::NOT_FOUND, envelope)
}
