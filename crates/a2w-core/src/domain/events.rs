//! Events pushed on `/ws/events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::delegation::{DelegationChain, DelegationOutcome};
use super::ids::{AgentId, DelegationId, TaskId};
use super::task::Weight;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    DelegationStarted {
        task_id: TaskId,
        delegation_id: DelegationId,
        delegate_to: AgentId,
        reason: String,
        chain: DelegationChain,
        timestamp: DateTime<Utc>,
    },
    DelegationFinished {
        task_id: TaskId,
        delegation_id: DelegationId,
        delegate_to: AgentId,
        outcome: DelegationOutcome,
        timestamp: DateTime<Utc>,
    },
    WeightUpdate {
        previous: Weight,
        weight: Weight,
        timestamp: DateTime<Utc>,
    },
    TaskRetried {
        task_id: TaskId,
        retry_of: TaskId,
        timestamp: DateTime<Utc>,
    },
    HealthWarning {
        component: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::DelegationStarted { .. } => "delegation_started",
            AgentEvent::DelegationFinished { .. } => "delegation_finished",
            AgentEvent::WeightUpdate { .. } => "weight_update",
            AgentEvent::TaskRetried { .. } => "task_retried",
            AgentEvent::HealthWarning { .. } => "health_warning",
        }
    }
}
