//! Errors - the A2W error taxonomy and the domain error type.
//!
//! # Taxonomy
//! | code | HTTP | recoverable |
//! |---|---|---|
//! | `E001_INTERNAL` | 500 | no |
//! | `E010_INVALID_INPUT` | 400 | yes |
//! | `E013_MISSING_DATA` | 400 | yes |
//! | `E020_PERMISSION_DENIED` | 403 | no |
//! | `E030_LOW_WEIGHT` | 403 | yes |
//! | `E040_TIMEOUT` | 504 | yes |
//! | `E050_EXTERNAL_DEPENDENCY` | 502 | yes |
//!
//! Every `A2wError` variant maps to exactly one code. Not-found and conflict
//! conditions stay under `E010` but answer with 404 / 409.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;

use super::delegation::DelegationChain;
use super::ids::{AgentId, IdError, TaskId};
use super::state::FsmState;
use super::task::Weight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E001_INTERNAL")]
    Internal,
    #[serde(rename = "E010_INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "E013_MISSING_DATA")]
    MissingData,
    #[serde(rename = "E020_PERMISSION_DENIED")]
    PermissionDenied,
    #[serde(rename = "E030_LOW_WEIGHT")]
    LowWeight,
    #[serde(rename = "E040_TIMEOUT")]
    Timeout,
    #[serde(rename = "E050_EXTERNAL_DEPENDENCY")]
    ExternalDependency,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Internal => "E001_INTERNAL",
            ErrorCode::InvalidInput => "E010_INVALID_INPUT",
            ErrorCode::MissingData => "E013_MISSING_DATA",
            ErrorCode::PermissionDenied => "E020_PERMISSION_DENIED",
            ErrorCode::LowWeight => "E030_LOW_WEIGHT",
            ErrorCode::Timeout => "E040_TIMEOUT",
            ErrorCode::ExternalDependency => "E050_EXTERNAL_DEPENDENCY",
        }
    }

    pub fn default_http_status(self) -> u16 {
        match self {
            ErrorCode::Internal => 500,
            ErrorCode::InvalidInput | ErrorCode::MissingData => 400,
            ErrorCode::PermissionDenied | ErrorCode::LowWeight => 403,
            ErrorCode::Timeout => 504,
            ErrorCode::ExternalDependency => 502,
        }
    }

    pub fn recoverable(self) -> bool {
        !matches!(self, ErrorCode::Internal | ErrorCode::PermissionDenied)
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCode::Internal => Severity::Critical,
            ErrorCode::InvalidInput | ErrorCode::LowWeight => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A2wError is the single domain error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum A2wError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unsupported protocol version {found} (supported major {supported})")]
    UnsupportedVersion { found: String, supported: u32 },

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {task_id} is still active ({state})")]
    TaskActive { task_id: TaskId, state: FsmState },

    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: FsmState,
        to: FsmState,
    },

    #[error("task {task_id} is not waiting (state {state})")]
    TaskNotWaiting { task_id: TaskId, state: FsmState },

    #[error("delegation to {target} would close a cycle in [{chain}]")]
    CycleDetected {
        target: AgentId,
        chain: DelegationChain,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(
        "interrupt refused: caller weight {caller_weight} exceeds requester weight {requester_weight} by at least {threshold}"
    )]
    LowWeightInterrupt {
        caller_weight: Weight,
        requester_weight: Weight,
        threshold: u8,
    },

    #[error("missing data: {message}")]
    MissingData {
        required: BTreeSet<String>,
        message: String,
    },

    #[error("task {task_id} interrupted ({state})")]
    Interrupted { task_id: TaskId, state: FsmState },

    #[error("report for task {0} is not available yet")]
    ReportPending(TaskId),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("external dependency failed: {0}")]
    ExternalDependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl A2wError {
    pub fn missing_data(required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let required: BTreeSet<String> = required.into_iter().map(Into::into).collect();
        let message = required.iter().cloned().collect::<Vec<_>>().join(", ");
        A2wError::MissingData { required, message }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            A2wError::InvalidInput(_)
            | A2wError::MalformedEnvelope(_)
            | A2wError::UnsupportedVersion { .. }
            | A2wError::NotFound(_)
            | A2wError::TaskActive { .. }
            | A2wError::IllegalTransition { .. }
            | A2wError::TaskNotWaiting { .. }
            | A2wError::CycleDetected { .. }
            | A2wError::Interrupted { .. }
            | A2wError::ReportPending(_) => ErrorCode::InvalidInput,
            A2wError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            A2wError::LowWeightInterrupt { .. } => ErrorCode::LowWeight,
            A2wError::MissingData { .. } => ErrorCode::MissingData,
            A2wError::Timeout(_) => ErrorCode::Timeout,
            A2wError::ExternalDependency(_) => ErrorCode::ExternalDependency,
            A2wError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            A2wError::NotFound(_) => 404,
            A2wError::TaskActive { .. }
            | A2wError::IllegalTransition { .. }
            | A2wError::TaskNotWaiting { .. }
            | A2wError::CycleDetected { .. }
            | A2wError::Interrupted { .. }
            | A2wError::ReportPending(_) => 409,
            other => other.code().default_http_status(),
        }
    }

    pub fn recoverable(&self) -> bool {
        self.code().recoverable()
    }

    pub fn severity(&self) -> Severity {
        self.code().default_severity()
    }

    /// Errors that affect a task's viability when raised during execution.
    /// They are pushed on `/ws/errors` and move the FSM; the rest stay local
    /// to the call that produced them.
    pub fn affects_viability(&self) -> bool {
        matches!(
            self,
            A2wError::MissingData { .. }
                | A2wError::Timeout(_)
                | A2wError::ExternalDependency(_)
                | A2wError::Internal(_)
        )
    }

    /// Structured context for the `details` field of the error payload.
    pub fn details(&self) -> Value {
        match self {
            A2wError::UnsupportedVersion { found, supported } => {
                json!({ "found": found, "supported_major": supported })
            }
            A2wError::NotFound(task_id) | A2wError::ReportPending(task_id) => {
                json!({ "task_id": task_id })
            }
            A2wError::TaskActive { task_id, state }
            | A2wError::TaskNotWaiting { task_id, state }
            | A2wError::Interrupted { task_id, state } => {
                json!({ "task_id": task_id, "state": state })
            }
            A2wError::IllegalTransition { task_id, from, to } => {
                json!({ "task_id": task_id, "from": from, "to": to })
            }
            A2wError::CycleDetected { target, chain } => {
                json!({ "delegate_to": target, "chain": chain })
            }
            A2wError::LowWeightInterrupt {
                caller_weight,
                requester_weight,
                threshold,
            } => json!({
                "caller_weight": caller_weight,
                "requester_weight": requester_weight,
                "threshold": threshold,
            }),
            A2wError::MissingData { required, .. } => json!({ "required": required }),
            _ => Value::Object(Default::default()),
        }
    }
}

impl From<IdError> for A2wError {
    fn from(err: IdError) -> Self {
        A2wError::InvalidInput(err.to_string())
    }
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub http_status: u16,
    pub severity: Severity,
    pub recoverable: bool,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
}
