//! Request extractors that answer rejections with error envelopes.
//!
//! Bodies may be the bare request document or a full `payload` envelope
//! wrapping it; an envelope goes through the codec (version check included)
//! before its payload is used.

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use crate::app::AgentRuntime;
use crate::domain::envelope::decode_value;
use crate::domain::{A2wError, Message};

/// JSON body, bare or enveloped.
pub struct A2wJson<T>(pub T);

impl<T> FromRequest<AgentRuntime> for A2wJson<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, runtime: &AgentRuntime) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, runtime).await.map_err(|e| {
            ApiError::new(runtime, &A2wError::InvalidInput(e.body_text()))
        })?;
        parse_body(&bytes)
            .map(A2wJson)
            .map_err(|e| ApiError::new(runtime, &e))
    }
}

pub(crate) fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, A2wError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| A2wError::InvalidInput(format!("request body is not JSON: {e}")))?;
    let document = if value.get("a2w_version").is_some() {
        match decode_value(value)?.message {
            Message::Payload(payload) => payload,
            other => {
                return Err(A2wError::InvalidInput(format!(
                    "expected a payload envelope, got {}",
                    other.message_type().as_str()
                )));
            }
        }
    } else {
        value
    };
    serde_json::from_value(document)
        .map_err(|e| A2wError::InvalidInput(format!("invalid request body: {e}")))
}

/// Query string.
pub struct A2wQuery<T>(pub T);

impl<T> FromRequestParts<AgentRuntime> for A2wQuery<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        runtime: &AgentRuntime,
    ) -> Result<Self, Self::Rejection> {
        Query::<T>::try_from_uri(&parts.uri)
            .map(|Query(query)| A2wQuery(query))
            .map_err(|e| ApiError::new(runtime, &A2wError::InvalidInput(e.body_text())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, Envelope, FsmState, StatusUpdate, TaskContext, TaskId};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn bare_body_is_accepted() {
        let body = json!({ "task_id": "T1", "task_type": "demo" }).to_string();
        let task: TaskContext = parse_body(body.as_bytes()).unwrap();
        assert_eq!(task.task_id, "T1");
    }

    #[test]
    fn enveloped_body_is_unwrapped() {
        let envelope = Envelope::encode(
            &AgentId::new("caller").unwrap(),
            Message::Payload(json!({ "task_id": "T1", "task_type": "demo", "extra": true })),
        );
        let body = serde_json::to_vec(&envelope).unwrap();
        let task: TaskContext = parse_body(&body).unwrap();
        assert_eq!(task.task_type, "demo");
    }

    #[test]
    fn newer_major_envelope_is_refused() {
        let body = json!({
            "a2w_version": "2.0",
            "agent_id": "caller",
            "message_type": "payload",
            "payload": {},
        })
        .to_string();
        let err = parse_body::<Value>(body.as_bytes()).unwrap_err();
        assert!(matches!(err, A2wError::UnsupportedVersion { .. }));
    }

    #[test]
    fn non_payload_envelope_is_refused() {
        let envelope = Envelope::encode(
            &AgentId::new("caller").unwrap(),
            Message::StatusUpdate(StatusUpdate {
                task_id: TaskId::new("T1").unwrap(),
                state: FsmState::Running,
                previous: None,
                progress: 0.0,
                telemetry: Value::Null,
                timestamp: Utc::now(),
            }),
        );
        let body = serde_json::to_vec(&envelope).unwrap();
        assert!(matches!(
            parse_body::<Value>(&body),
            Err(A2wError::InvalidInput(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_input() {
        assert!(matches!(
            parse_body::<Value>(b"{not json"),
            Err(A2wError::InvalidInput(_))
        ));
    }
}
