//! Need / Insight Exchange.
//!
//! `raise_need` suspends a running task on a set of required keys and
//! broadcasts a `need_data` envelope; `provide_insight` merges incoming data
//! into the task's continuation and resumes it once the configured
//! [`PartialInsightPolicy`] is satisfied.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::app::broadcaster::StatusBroadcaster;
use crate::app::fsm::FsmEngine;
use crate::app::registry::{ExecutionState, TaskEntry, TaskRegistry};
use crate::domain::{
    A2wError, Continuation, FsmState, InsightAck, Message, NeedSignal, PartialInsightPolicy,
    TaskId, TransitionCause, Urgency,
};
use crate::ports::Clock;

/// Result of one insight delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightDelivery {
    pub ack: InsightAck,
    /// The task resumed but has no executor parked on it any more (for
    /// example after a failure routed it to `blocked`); it must be relaunched.
    pub relaunch: bool,
}

pub struct NeedInsightExchange {
    registry: Arc<TaskRegistry>,
    fsm: Arc<FsmEngine>,
    broadcaster: Arc<StatusBroadcaster>,
    clock: Arc<dyn Clock>,
    policy: PartialInsightPolicy,
}

impl NeedInsightExchange {
    pub fn new(
        registry: Arc<TaskRegistry>,
        fsm: Arc<FsmEngine>,
        broadcaster: Arc<StatusBroadcaster>,
        clock: Arc<dyn Clock>,
        policy: PartialInsightPolicy,
    ) -> Self {
        Self {
            registry,
            fsm,
            broadcaster,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> PartialInsightPolicy {
        self.policy
    }

    /// Suspends a `running` task until `required` is provided.
    pub async fn raise_need(
        &self,
        task_id: &TaskId,
        required: BTreeSet<String>,
        urgency: Urgency,
        description: impl Into<String>,
    ) -> Result<NeedSignal, A2wError> {
        let entry = self.registry.entry(task_id).await?;
        let mut st = entry.lock().await;
        if st.state != FsmState::Running {
            return Err(A2wError::IllegalTransition {
                task_id: task_id.clone(),
                from: st.state,
                to: FsmState::Waiting,
            });
        }
        self.suspend(&entry, &mut st, required, urgency, description.into())
    }

    /// Moves the task to `waiting` and records its continuation. The caller
    /// holds the entry lock and has checked the source state.
    pub(crate) fn suspend(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
        required: BTreeSet<String>,
        urgency: Urgency,
        description: String,
    ) -> Result<NeedSignal, A2wError> {
        if required.is_empty() {
            return Err(A2wError::InvalidInput(
                "a need must name at least one required key".into(),
            ));
        }
        self.fsm
            .apply(entry, st, FsmState::Waiting, TransitionCause::Requested)?;

        let signal = NeedSignal {
            task_id: entry.task_id().clone(),
            required,
            urgency,
            description,
            timestamp: self.clock.now(),
        };
        st.continuation = Some(Continuation::from_signal(&signal));
        self.broadcaster.emit(Message::NeedData(signal.clone()));
        info!(
            task_id = %signal.task_id,
            required = ?signal.required,
            urgency = ?signal.urgency,
            "task waiting for data"
        );
        Ok(signal)
    }

    /// Delivers insight to a `waiting` task.
    pub async fn provide_insight(
        &self,
        task_id: &TaskId,
        payload: Map<String, Value>,
        rating: Option<f64>,
    ) -> Result<InsightDelivery, A2wError> {
        if let Some(rating) = rating
            && !(0.0..=1.0).contains(&rating)
        {
            return Err(A2wError::InvalidInput(format!(
                "rating must be within [0.0, 1.0], got {rating}"
            )));
        }

        let entry = self.registry.entry(task_id).await?;
        let mut st = entry.lock().await;
        if st.state != FsmState::Waiting {
            return Err(A2wError::TaskNotWaiting {
                task_id: task_id.clone(),
                state: st.state,
            });
        }

        if let Some(rating) = rating {
            st.ratings.push(rating);
        }
        let resumed = {
            let continuation = st.continuation.get_or_insert_with(|| Continuation {
                task_id: task_id.clone(),
                required: BTreeSet::new(),
                urgency: Urgency::default(),
                description: String::new(),
                raised_at: self.clock.now(),
                received: BTreeSet::new(),
            });
            continuation.absorb(&payload);
            continuation.should_resume(self.policy)
        };
        let outstanding = st
            .continuation
            .as_ref()
            .map(Continuation::outstanding)
            .unwrap_or_default();
        st.insights.extend(payload);

        if resumed {
            self.fsm
                .apply(&entry, &mut st, FsmState::Running, TransitionCause::Requested)?;
            st.continuation = None;
        }
        info!(%task_id, resumed, outstanding = outstanding.len(), "insight delivered");

        Ok(InsightDelivery {
            ack: InsightAck {
                task_id: task_id.clone(),
                state: st.state,
                resumed,
                outstanding,
            },
            relaunch: resumed && !st.executor_live(),
        })
    }
}
