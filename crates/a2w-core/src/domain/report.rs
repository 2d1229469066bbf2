//! Reports and logs - what a finished task leaves behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::Envelope;
use super::ids::TaskId;
use super::state::FsmState;

/// Artifact produced by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Text(String),
    Json(Value),
    Url(String),
    FilePath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Ordinary table transition.
    Requested,
    /// Graceful stop request.
    Stop,
    /// Immediate terminate request.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: FsmState,
    pub to: FsmState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

/// Body of `GET /report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub task_type: String,
    pub state: FsmState,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub telemetry: Value,
    pub history: Vec<TransitionRecord>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub envelope: Envelope,
}

/// Body of `GET /logs`: entries with `seq > cursor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    /// Cursor to pass on the next call; unchanged when nothing was returned.
    pub next_cursor: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_is_kind_tagged() {
        let artifact = Artifact::Json(json!({ "trend": "up" }));
        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({ "kind": "json", "value": { "trend": "up" } })
        );
        let path = Artifact::FilePath("/tmp/out.md".into());
        assert_eq!(serde_json::to_value(&path).unwrap()["kind"], "file_path");
    }
}
