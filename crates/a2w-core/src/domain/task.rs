//! Task Context - the unit of work submitted to an agent.
//!
//! `priority` and `weight_caller` are bounded levels in `[0, 100]`; values
//! outside the range are rejected while decoding, so a `TaskContext` that
//! exists is always in range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::delegation::DelegationChain;
use super::errors::A2wError;
use super::ids::{AgentId, TaskId};

/// Metadata key carrying the delegation chain.
pub const DELEGATION_CHAIN_KEY: &str = "delegation_chain";

pub const LEVEL_MIN: i64 = 0;
pub const LEVEL_MAX: i64 = 100;

fn check_level(field: &str, value: i64) -> Result<u8, A2wError> {
    if (LEVEL_MIN..=LEVEL_MAX).contains(&value) {
        Ok(value as u8)
    } else {
        Err(A2wError::InvalidInput(format!(
            "{field} must be within [{LEVEL_MIN}, {LEVEL_MAX}], got {value}"
        )))
    }
}

/// Weight is an agent's standing, used for ordering and interrupt authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Weight(u8);

impl Weight {
    pub fn new(value: i64) -> Result<Self, A2wError> {
        check_level("weight", value).map(Self)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Weight {
    fn default() -> Self {
        Self(50)
    }
}

impl TryFrom<i64> for Weight {
    type Error = A2wError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Weight> for u8 {
    fn from(weight: Weight) -> Self {
        weight.0
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority of a single task, as declared by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub fn new(value: i64) -> Result<Self, A2wError> {
        check_level("priority", value).map(Self)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(50)
    }
}

impl TryFrom<i64> for Priority {
    type Error = A2wError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TaskContext describes a unit of work.
///
/// `task_id` is the idempotency key: the first submission wins and later
/// submissions with the same id are answered with the original handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_agent: Option<AgentId>,
    #[serde(default)]
    pub weight_caller: Weight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<TaskId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskContext {
    pub fn new(task_id: TaskId, task_type: impl Into<String>) -> Self {
        Self {
            task_id,
            task_type: task_type.into(),
            description: String::new(),
            payload: Value::Null,
            priority: Priority::default(),
            deadline: None,
            caller_agent: None,
            weight_caller: Weight::default(),
            parent_task_id: None,
            retry_of: None,
            metadata: Map::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight_caller(mut self, weight: Weight) -> Self {
        self.weight_caller = weight;
        self
    }

    pub fn with_caller(mut self, caller: AgentId) -> Self {
        self.caller_agent = Some(caller);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checks that do not depend on the rest of the runtime.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), A2wError> {
        if self.task_type.trim().is_empty() {
            return Err(A2wError::InvalidInput("task_type must not be empty".into()));
        }
        if let Some(deadline) = self.deadline
            && deadline <= now
        {
            return Err(A2wError::InvalidInput(format!(
                "deadline {} is already in the past",
                deadline.to_rfc3339()
            )));
        }
        // surfaces a malformed chain at the boundary
        self.delegation_chain()?;
        Ok(())
    }

    /// Reads the chain from `metadata`; a missing key is an empty chain.
    pub fn delegation_chain(&self) -> Result<DelegationChain, A2wError> {
        match self.metadata.get(DELEGATION_CHAIN_KEY) {
            None | Some(Value::Null) => Ok(DelegationChain::default()),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                A2wError::InvalidInput(format!("metadata.{DELEGATION_CHAIN_KEY}: {e}"))
            }),
        }
    }

    pub fn set_delegation_chain(&mut self, chain: &DelegationChain) {
        let agents = chain
            .agents()
            .iter()
            .map(|agent| Value::String(agent.to_string()))
            .collect();
        self.metadata
            .insert(DELEGATION_CHAIN_KEY.to_string(), Value::Array(agents));
    }
}
