//! Delegation data: the chain carried in task metadata, outbound requests and
//! the outcomes a delegate can answer with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use super::ids::{AgentId, DelegationId};
use super::state::FsmState;
use super::task::TaskContext;

/// Ordered record of agents that already handed the task on.
///
/// Plain data: it travels inside `TaskContext::metadata` across process
/// boundaries instead of pointing at live peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationChain(Vec<AgentId>);

impl DelegationChain {
    pub fn agents(&self) -> &[AgentId] {
        &self.0
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.0.contains(agent)
    }

    pub fn last(&self) -> Option<&AgentId> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends `agent` unless it is already the most recent handler.
    pub fn push(&mut self, agent: AgentId) {
        if self.last() != Some(&agent) {
            self.0.push(agent);
        }
    }
}

impl From<Vec<AgentId>> for DelegationChain {
    fn from(agents: Vec<AgentId>) -> Self {
        Self(agents)
    }
}

impl fmt::Display for DelegationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.iter().map(AgentId::as_str).collect();
        f.write_str(&parts.join(" -> "))
    }
}

/// An outbound handoff built by the delegation manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub delegation_id: DelegationId,
    pub from_agent: AgentId,
    pub delegate_to: AgentId,
    pub reason: String,
    /// Context forwarded to the delegate, chain already extended.
    pub task: TaskContext,
    pub created_at: DateTime<Utc>,
}

/// What the delegate answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DelegationOutcome {
    Accepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Rejected {
        reason: String,
    },
    NeedsInput {
        required: BTreeSet<String>,
        #[serde(default)]
        description: String,
    },
    Failed {
        reason: String,
    },
}

impl DelegationOutcome {
    /// State the delegating task moves to once the outcome is known.
    pub fn target_state(&self) -> FsmState {
        match self {
            DelegationOutcome::Accepted { .. } | DelegationOutcome::Rejected { .. } => {
                FsmState::Running
            }
            DelegationOutcome::NeedsInput { .. } => FsmState::Waiting,
            DelegationOutcome::Failed { .. } => FsmState::Terminated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DelegationOutcome::Accepted { .. } => "accepted",
            DelegationOutcome::Rejected { .. } => "rejected",
            DelegationOutcome::NeedsInput { .. } => "needs_input",
            DelegationOutcome::Failed { .. } => "failed",
        }
    }
}
