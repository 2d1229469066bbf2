//! Need / insight data.
//!
//! A suspended task is described by an explicit [`Continuation`] record rather
//! than a parked call stack, so it can be resumed by re-invoking the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::ids::TaskId;
use super::state::FsmState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Payload of a `need_data` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedSignal {
    pub task_id: TaskId,
    pub required: BTreeSet<String>,
    pub urgency: Urgency,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// How insight carrying only part of the required keys is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialInsightPolicy {
    /// Stay `waiting` until every required key has arrived.
    #[default]
    AwaitAll,
    /// Resume on the first insight, whatever it contains.
    ResumeOptimistic,
}

/// Why and on what a task is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Continuation {
    pub task_id: TaskId,
    pub required: BTreeSet<String>,
    pub urgency: Urgency,
    pub description: String,
    pub raised_at: DateTime<Utc>,
    /// Keys delivered since the need was raised.
    #[serde(default)]
    pub received: BTreeSet<String>,
}

impl Continuation {
    pub fn from_signal(signal: &NeedSignal) -> Self {
        Self {
            task_id: signal.task_id.clone(),
            required: signal.required.clone(),
            urgency: signal.urgency,
            description: signal.description.clone(),
            raised_at: signal.timestamp,
            received: BTreeSet::new(),
        }
    }

    pub fn absorb(&mut self, payload: &Map<String, Value>) {
        self.received.extend(payload.keys().cloned());
    }

    pub fn outstanding(&self) -> BTreeSet<String> {
        self.required.difference(&self.received).cloned().collect()
    }

    pub fn is_satisfied(&self) -> bool {
        self.required.is_subset(&self.received)
    }

    pub fn should_resume(&self, policy: PartialInsightPolicy) -> bool {
        match policy {
            PartialInsightPolicy::AwaitAll => self.is_satisfied(),
            PartialInsightPolicy::ResumeOptimistic => true,
        }
    }
}

/// Answer to `provideInsight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightAck {
    pub task_id: TaskId,
    pub state: FsmState,
    pub resumed: bool,
    pub outstanding: BTreeSet<String>,
}
