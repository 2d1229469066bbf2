//! Agent Record - this process's identity, weight and delegation permissions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};

use super::ids::AgentId;
use super::task::Weight;

/// AgentRecord is created once at start-up and lives as long as the process.
///
/// The weight is the only mutable part; it is changed through
/// `AgentRuntime::update_weight`, which performs authorization.
#[derive(Debug)]
pub struct AgentRecord {
    agent_id: AgentId,
    weight: AtomicU8,
    allowed_callers: BTreeSet<AgentId>,
    allowed_callees: BTreeSet<AgentId>,
}

impl AgentRecord {
    pub fn new(
        agent_id: AgentId,
        weight: Weight,
        allowed_callers: BTreeSet<AgentId>,
        allowed_callees: BTreeSet<AgentId>,
    ) -> Self {
        Self {
            agent_id,
            weight: AtomicU8::new(weight.value()),
            allowed_callers,
            allowed_callees,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn weight(&self) -> Weight {
        // only validated weights are ever stored
        Weight::new(i64::from(self.weight.load(Ordering::Acquire))).unwrap_or_default()
    }

    /// Replaces the weight and returns the previous one.
    pub(crate) fn set_weight(&self, weight: Weight) -> Weight {
        let previous = self.weight.swap(weight.value(), Ordering::AcqRel);
        Weight::new(i64::from(previous)).unwrap_or_default()
    }

    /// An empty caller set accepts every caller.
    pub fn accepts_caller(&self, caller: Option<&AgentId>) -> bool {
        if self.allowed_callers.is_empty() {
            return true;
        }
        caller.is_some_and(|c| self.allowed_callers.contains(c))
    }

    /// Delegation targets must be listed explicitly.
    pub fn may_delegate_to(&self, callee: &AgentId) -> bool {
        self.allowed_callees.contains(callee)
    }

    pub fn allowed_callers(&self) -> &BTreeSet<AgentId> {
        &self.allowed_callers
    }

    pub fn allowed_callees(&self) -> &BTreeSet<AgentId> {
        &self.allowed_callees
    }
}

/// Body of `GET /manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub agent_id: AgentId,
    pub weight: Weight,
    pub a2w_version: String,
    pub task_types: Vec<String>,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    pub allowed_callers: BTreeSet<AgentId>,
    pub allowed_callees: BTreeSet<AgentId>,
}
