//! Error Reporter - turns failures into `error` envelopes.
//!
//! Local failures are only returned to the caller (`envelope`). Failures that
//! affect a task's viability are also pushed on `/ws/errors` (`push`); moving
//! the FSM is left to the runtime.

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::app::broadcaster::StatusBroadcaster;
use crate::domain::{A2wError, Envelope, ErrorCode, ErrorPayload, Message, Severity, TaskId};
use crate::ports::Clock;

pub struct ErrorReporter {
    broadcaster: Arc<StatusBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl ErrorReporter {
    pub fn new(broadcaster: Arc<StatusBroadcaster>, clock: Arc<dyn Clock>) -> Self {
        Self { broadcaster, clock }
    }

    /// Builds an error envelope from explicit parts.
    pub fn report(
        &self,
        code: ErrorCode,
        http_status: u16,
        severity: Severity,
        recoverable: bool,
        message: impl Into<String>,
        details: Value,
    ) -> Envelope {
        let payload = ErrorPayload {
            code,
            http_status,
            severity,
            recoverable,
            message: message.into(),
            details,
            task_id: None,
            timestamp: self.clock.now(),
        };
        Envelope::encode(self.broadcaster.agent_id(), Message::Error(payload))
    }

    pub fn payload(&self, err: &A2wError, task_id: Option<&TaskId>) -> ErrorPayload {
        ErrorPayload {
            code: err.code(),
            http_status: err.http_status(),
            severity: err.severity(),
            recoverable: err.recoverable(),
            message: err.to_string(),
            details: err.details(),
            task_id: task_id.cloned(),
            timestamp: self.clock.now(),
        }
    }

    /// Synchronous reply for a failed call.
    pub fn envelope(&self, err: &A2wError, task_id: Option<&TaskId>) -> Envelope {
        Envelope::encode(
            self.broadcaster.agent_id(),
            Message::Error(self.payload(err, task_id)),
        )
    }

    /// Pushes the error on `/ws/errors` and returns what was sent.
    pub fn push(&self, err: &A2wError, task_id: Option<&TaskId>) -> ErrorPayload {
        let payload = self.payload(err, task_id);
        match payload.severity {
            Severity::Critical | Severity::Error => {
                error!(code = %payload.code, task_id = ?task_id.map(TaskId::as_str), "{err}")
            }
            _ => warn!(code = %payload.code, task_id = ?task_id.map(TaskId::as_str), "{err}"),
        }
        self.broadcaster.emit(Message::Error(payload.clone()));
        payload
    }
}
