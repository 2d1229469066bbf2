//! Envelope - the common wrapper around every A2W message, and its codec.
//!
//! # Wire shape
//! ```json
//! { "a2w_version": "1.0", "agent_id": "...", "message_type": "status_update", "payload": { ... } }
//! ```
//!
//! `message_type` is a closed set and the payload is decoded into the variant
//! it names, so an envelope whose payload does not fit its type cannot be
//! built. Readers ignore unknown fields and accept newer minor versions; a
//! newer major version is refused.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::errors::{A2wError, ErrorPayload};
use super::events::AgentEvent;
use super::ids::{AgentId, TaskId};
use super::need::NeedSignal;
use super::state::FsmState;

/// Protocol version written by this implementation.
pub const A2W_VERSION: &str = "1.0";

/// Highest major version this codec decodes.
pub const SUPPORTED_MAJOR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    StatusUpdate,
    NeedData,
    Error,
    Event,
    Payload,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::StatusUpdate => "status_update",
            MessageType::NeedData => "need_data",
            MessageType::Error => "error",
            MessageType::Event => "event",
            MessageType::Payload => "payload",
        }
    }
}

/// Payload of a `status_update` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub state: FsmState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<FsmState>,
    pub progress: f64,
    #[serde(default)]
    pub telemetry: Value,
    pub timestamp: DateTime<Utc>,
}

/// Message body, keyed by its `message_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    StatusUpdate(StatusUpdate),
    NeedData(NeedSignal),
    Error(ErrorPayload),
    Event(AgentEvent),
    /// Request and response bodies of the REST surface.
    Payload(Value),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::StatusUpdate(_) => MessageType::StatusUpdate,
            Message::NeedData(_) => MessageType::NeedData,
            Message::Error(_) => MessageType::Error,
            Message::Event(_) => MessageType::Event,
            Message::Payload(_) => MessageType::Payload,
        }
    }

    fn payload_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Message::StatusUpdate(update) => serde_json::to_value(update),
            Message::NeedData(signal) => serde_json::to_value(signal),
            Message::Error(error) => serde_json::to_value(error),
            Message::Event(event) => serde_json::to_value(event),
            Message::Payload(value) => Ok(value.clone()),
        }
    }

    fn from_parts(message_type: MessageType, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match message_type {
            MessageType::StatusUpdate => Message::StatusUpdate(serde_json::from_value(payload)?),
            MessageType::NeedData => Message::NeedData(serde_json::from_value(payload)?),
            MessageType::Error => Message::Error(serde_json::from_value(payload)?),
            MessageType::Event => Message::Event(serde_json::from_value(payload)?),
            MessageType::Payload => Message::Payload(payload),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub version: String,
    pub agent_id: AgentId,
    pub message: Message,
}

impl Envelope {
    /// Wraps `message` for sending by `agent_id`.
    pub fn encode(agent_id: &AgentId, message: Message) -> Self {
        Self {
            version: A2W_VERSION.to_string(),
            agent_id: agent_id.clone(),
            message,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    pub fn to_json(&self) -> Result<String, A2wError> {
        serde_json::to_string(self).map_err(|e| A2wError::Internal(format!("encode envelope: {e}")))
    }
}

/// Decodes an envelope from raw bytes.
pub fn decode(bytes: &[u8]) -> Result<Envelope, A2wError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| A2wError::MalformedEnvelope(format!("not JSON: {e}")))?;
    decode_value(value)
}

/// Decodes an envelope from an already parsed JSON document.
pub fn decode_value(value: Value) -> Result<Envelope, A2wError> {
    let Some(object) = value.as_object() else {
        return Err(A2wError::MalformedEnvelope("expected a JSON object".into()));
    };
    // the version is checked before anything else: a newer major may use
    // message types or payload shapes this codec does not know
    let version = object
        .get("a2w_version")
        .and_then(Value::as_str)
        .ok_or_else(|| A2wError::MalformedEnvelope("missing a2w_version".into()))?;
    check_version(version)?;

    let wire: WireEnvelope =
        serde_json::from_value(value).map_err(|e| A2wError::MalformedEnvelope(e.to_string()))?;
    let message = Message::from_parts(wire.message_type, wire.payload).map_err(|e| {
        A2wError::MalformedEnvelope(format!(
            "payload does not match {}: {e}",
            wire.message_type.as_str()
        ))
    })?;
    Ok(Envelope {
        version: wire.a2w_version,
        agent_id: wire.agent_id,
        message,
    })
}

/// Accepts `MAJOR.MINOR[.PATCH]` with `MAJOR <= SUPPORTED_MAJOR`.
pub fn check_version(version: &str) -> Result<(), A2wError> {
    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok());
    let rest_numeric = parts.all(|p| p.parse::<u32>().is_ok());
    let Some(major) = major.filter(|_| rest_numeric && version.contains('.')) else {
        return Err(A2wError::MalformedEnvelope(format!(
            "a2w_version {version:?} is not MAJOR.MINOR"
        )));
    };
    if major > SUPPORTED_MAJOR {
        return Err(A2wError::UnsupportedVersion {
            found: version.to_string(),
            supported: SUPPORTED_MAJOR,
        });
    }
    Ok(())
}

#[derive(Deserialize)]
struct WireEnvelope {
    a2w_version: String,
    agent_id: AgentId,
    message_type: MessageType,
    #[serde(default)]
    payload: Value,
}

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    a2w_version: &'a str,
    agent_id: &'a AgentId,
    message_type: MessageType,
    payload: Value,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = self.message.payload_value().map_err(S::Error::custom)?;
        WireEnvelopeRef {
            a2w_version: &self.version,
            agent_id: &self.agent_id,
            message_type: self.message.message_type(),
            payload,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ErrorCode, Severity};
    use rstest::rstest;
    use serde_json::json;

    fn agent() -> AgentId {
        AgentId::new("agent-a").unwrap()
    }

    fn status_envelope() -> Envelope {
        Envelope::encode(
            &agent(),
            Message::StatusUpdate(StatusUpdate {
                task_id: TaskId::new("T1").unwrap(),
                state: FsmState::Running,
                previous: Some(FsmState::Initializing),
                progress: 0.25,
                telemetry: json!({ "step": 1 }),
                timestamp: Utc::now(),
            }),
        )
    }

    #[test]
    fn encodes_the_wire_shape() {
        let value = serde_json::to_value(status_envelope()).unwrap();
        assert_eq!(value["a2w_version"], A2W_VERSION);
        assert_eq!(value["agent_id"], "agent-a");
        assert_eq!(value["message_type"], "status_update");
        assert_eq!(value["payload"]["state"], "running");
    }

    #[test]
    fn decode_reverses_encode() {
        let envelope = status_envelope();
        let bytes = envelope.to_json().unwrap();
        assert_eq!(decode(bytes.as_bytes()).unwrap(), envelope);
    }

    #[test]
    fn unknown_fields_and_newer_minor_are_ignored() {
        let raw = json!({
            "a2w_version": "1.7",
            "agent_id": "peer",
            "message_type": "payload",
            "payload": { "x": 1 },
            "trace": "ignored"
        });
        let envelope = decode_value(raw).unwrap();
        assert_eq!(envelope.message, Message::Payload(json!({ "x": 1 })));
        assert_eq!(envelope.version, "1.7");
    }

    #[test]
    fn newer_major_is_unsupported_even_with_unknown_type() {
        let raw = json!({
            "a2w_version": "2.0",
            "agent_id": "peer",
            "message_type": "hologram",
            "payload": {}
        });
        assert!(matches!(
            decode_value(raw),
            Err(A2wError::UnsupportedVersion { supported: 1, .. })
        ));
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(b"[1, 2]".as_slice())]
    #[case(br#"{"agent_id":"a","message_type":"payload"}"#.as_slice())]
    #[case(br#"{"a2w_version":"one","agent_id":"a","message_type":"payload"}"#.as_slice())]
    #[case(br#"{"a2w_version":"1.0","agent_id":"a","message_type":"gossip"}"#.as_slice())]
    #[case(br#"{"a2w_version":"1.0","agent_id":"a","message_type":"status_update","payload":{"x":1}}"#.as_slice())]
    fn malformed_input(#[case] bytes: &[u8]) {
        assert!(matches!(decode(bytes), Err(A2wError::MalformedEnvelope(_))));
    }

    #[test]
    fn error_payload_uses_taxonomy_code() {
        let envelope = Envelope::encode(
            &agent(),
            Message::Error(ErrorPayload {
                code: ErrorCode::Timeout,
                http_status: 504,
                severity: Severity::Error,
                recoverable: true,
                message: "deadline passed".into(),
                details: json!({}),
                task_id: None,
                timestamp: Utc::now(),
            }),
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["message_type"], "error");
        assert_eq!(value["payload"]["code"], "E040_TIMEOUT");
    }
}
