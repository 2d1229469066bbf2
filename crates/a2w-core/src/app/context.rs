//! ExecutionContext - an executor's only handle on the runtime.
//!
//! One context is built per executor invocation. It owns the invocation's
//! execution slot: the slot is given back while the task waits on a need
//! and taken again when it resumes.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::app::registry::{Control, TaskEntry};
use crate::app::runtime::AgentRuntime;
use crate::domain::{A2wError, AgentId, DelegationOutcome, FsmState, TaskContext, TaskId, Urgency};

pub struct ExecutionContext {
    runtime: AgentRuntime,
    entry: Arc<TaskEntry>,
    slot: Mutex<Option<OwnedSemaphorePermit>>,
}

impl ExecutionContext {
    pub(crate) fn new(
        runtime: AgentRuntime,
        entry: Arc<TaskEntry>,
        slot: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            runtime,
            entry,
            slot: Mutex::new(slot),
        }
    }

    /// The context the task was submitted with.
    pub fn task(&self) -> &TaskContext {
        self.entry.context()
    }

    pub fn task_id(&self) -> &TaskId {
        self.entry.task_id()
    }

    pub fn agent_id(&self) -> &AgentId {
        self.runtime.agent_id()
    }

    /// Progress in `[0.0, 1.0]`; it may not go backwards.
    pub async fn report_progress(&self, progress: f64, telemetry: Value) -> Result<(), A2wError> {
        self.runtime
            .fsm()
            .record_progress(&self.entry, progress, telemetry)
            .await
    }

    /// Safe point. Returns `Err(Interrupted)` once the task was stopped or
    /// terminated; the executor should return that error as is.
    pub async fn checkpoint(&self) -> Result<(), A2wError> {
        let fsm = self.runtime.fsm();
        let transition = {
            let mut st = self.entry.lock().await;
            if st.state.is_terminal() {
                return Err(A2wError::Interrupted {
                    task_id: self.task_id().clone(),
                    state: st.state,
                });
            }
            if !st.stop_requested {
                return Ok(());
            }
            fsm.complete_stop(&self.entry, &mut st)?
        };
        fsm.settle(&self.entry, &transition).await;
        debug!(task_id = %self.task_id(), "stopped at checkpoint");
        Err(A2wError::Interrupted {
            task_id: self.task_id().clone(),
            state: FsmState::Stopped,
        })
    }

    /// Raises a need and waits until insight resumes the task.
    ///
    /// Returns every insight delivered to the task so far.
    pub async fn need<I, S>(
        &self,
        required: I,
        urgency: Urgency,
        description: impl Into<String>,
    ) -> Result<Map<String, Value>, A2wError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkpoint().await?;
        let required: BTreeSet<String> = required.into_iter().map(Into::into).collect();
        self.runtime
            .exchange()
            .raise_need(self.task_id(), required, urgency, description)
            .await?;
        // a stop that raced the need completes now that the task is parked
        self.checkpoint().await?;
        self.release_slot();
        self.wait_for_resume().await
    }

    /// Insight accumulated over the task's lifetime.
    pub async fn insights(&self) -> Map<String, Value> {
        self.entry.lock().await.insights.clone()
    }

    /// Hands the task to `to` and waits for the outcome.
    ///
    /// `Accepted` and `Rejected` return with the task running again;
    /// `NeedsInput` returns once insight resumed it. `Failed` terminates the
    /// task and comes back as `Err(Interrupted)`.
    pub async fn delegate(
        &self,
        to: &AgentId,
        reason: impl Into<String>,
    ) -> Result<DelegationOutcome, A2wError> {
        self.checkpoint().await?;
        let request = self.runtime.delegate(self.task_id(), to, reason).await?;

        let outcome = match self.runtime.transport() {
            Some(transport) => {
                let outcome = transport.dispatch(&request).await.unwrap_or_else(|e| {
                    warn!(
                        task_id = %self.task_id(),
                        delegate_to = %request.delegate_to,
                        error = %e,
                        "delegation dispatch failed"
                    );
                    DelegationOutcome::Rejected {
                        reason: e.to_string(),
                    }
                });
                if let Err(e) = self
                    .runtime
                    .resolve_delegation(self.task_id(), outcome.clone())
                    .await
                {
                    self.checkpoint().await?;
                    return Err(e);
                }
                outcome
            }
            None => self.wait_for_resolution().await?,
        };

        match &outcome {
            DelegationOutcome::NeedsInput { .. } => {
                self.checkpoint().await?;
                self.release_slot();
                self.wait_for_resume().await?;
            }
            DelegationOutcome::Failed { .. } => {
                return Err(A2wError::Interrupted {
                    task_id: self.task_id().clone(),
                    state: FsmState::Terminated,
                });
            }
            _ => {}
        }
        self.checkpoint().await?;
        Ok(outcome)
    }

    /// Waits for an external `resolve_delegation`, or for a stop request.
    async fn wait_for_resolution(&self) -> Result<DelegationOutcome, A2wError> {
        let mut state_rx = self.entry.subscribe_state();
        let mut control_rx = self.entry.subscribe_control();
        let stop = tokio::select! {
            changed = state_rx.wait_for(|s| *s != FsmState::Delegating) => {
                changed
                    .map(|_| false)
                    .map_err(|_| A2wError::Internal("task state channel closed".into()))?
            }
            stop = control_rx.wait_for(|c| *c == Control::Stop) => stop.is_ok(),
        };
        if stop {
            self.checkpoint().await?;
        }
        let st = self.entry.lock().await;
        match &st.delegation_outcome {
            Some(outcome) if !st.state.is_terminal() || matches!(outcome, DelegationOutcome::Failed { .. }) => {
                Ok(outcome.clone())
            }
            _ => Err(A2wError::Interrupted {
                task_id: self.task_id().clone(),
                state: st.state,
            }),
        }
    }

    /// Parks until the task leaves `waiting`, then takes a slot again.
    async fn wait_for_resume(&self) -> Result<Map<String, Value>, A2wError> {
        let mut state_rx = self.entry.subscribe_state();
        let state = *state_rx
            .wait_for(|s| *s != FsmState::Waiting)
            .await
            .map_err(|_| A2wError::Internal("task state channel closed".into()))?;
        if state != FsmState::Running {
            return Err(A2wError::Interrupted {
                task_id: self.task_id().clone(),
                state,
            });
        }
        self.ensure_slot().await?;
        debug!(task_id = %self.task_id(), "resumed");
        Ok(self.insights().await)
    }

    pub(crate) async fn ensure_slot(&self) -> Result<(), A2wError> {
        if self.slot_guard().is_some() {
            return Ok(());
        }
        let permit = self
            .runtime
            .slots()
            .acquire_owned()
            .await
            .map_err(|_| A2wError::Internal("execution slots closed".into()))?;
        *self.slot_guard() = Some(permit);
        Ok(())
    }

    fn release_slot(&self) {
        self.slot_guard().take();
    }

    fn slot_guard(&self) -> std::sync::MutexGuard<'_, Option<OwnedSemaphorePermit>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
