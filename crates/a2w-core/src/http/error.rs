//! API error type

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::app::AgentRuntime;
use crate::domain::{A2wError, Envelope, TaskId};

/// A failed call, already rendered as an `error` envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    envelope: Envelope,
}

impl ApiError {
    pub fn new(runtime: &AgentRuntime, err: &A2wError) -> Self {
        Self::for_task(runtime, err, None)
    }

    pub fn for_task(runtime: &AgentRuntime, err: &A2wError, task_id: Option<&TaskId>) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            envelope: runtime.reporter().envelope(err, task_id),
        }
    }

    pub fn from_envelope(status: StatusCode, envelope: Envelope) -> Self {
        Self { status, envelope }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
