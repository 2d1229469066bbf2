//! FSM Engine - the only writer of a task's FSM state.
//!
//! All mutations go through [`FsmEngine::apply`] while the caller holds the
//! task's entry lock. `apply` checks the transition, records it, publishes it
//! on the entry's watch channel and emits a `status_update`.
//!
//! Stop and terminate are separate requests:
//! - **stop** is graceful. A task with a busy executor only gets a stop flag;
//!   the transition to `stopped` happens at the executor's next checkpoint
//!   (or is forced by the runtime after the grace period)
//! - **terminate** is immediate. The executor is aborted and the task moves
//!   to `terminated` in the same call

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};

use crate::app::broadcaster::StatusBroadcaster;
use crate::app::registry::{Control, ExecutionState, TaskEntry, TaskRegistry};
use crate::domain::{
    A2wError, FsmState, Message, StatusUpdate, TaskId, TransitionCause, TransitionRecord,
};
use crate::ports::{Clock, ReportStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub task_id: TaskId,
    pub from: FsmState,
    pub to: FsmState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// The task is already `stopped`.
    Stopped(Transition),
    /// The executor was asked to stop at its next checkpoint.
    Pending { state: FsmState },
}

pub struct FsmEngine {
    registry: Arc<TaskRegistry>,
    broadcaster: Arc<StatusBroadcaster>,
    store: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
}

impl FsmEngine {
    pub fn new(
        registry: Arc<TaskRegistry>,
        broadcaster: Arc<StatusBroadcaster>,
        store: Arc<dyn ReportStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            store,
            clock,
        }
    }

    /// Ordinary transition along the table.
    pub async fn transition(&self, task_id: &TaskId, target: FsmState) -> Result<Transition, A2wError> {
        let entry = self.registry.entry(task_id).await?;
        let transition = {
            let mut st = entry.lock().await;
            self.apply(&entry, &mut st, target, TransitionCause::Requested)?
        };
        self.settle(&entry, &transition).await;
        Ok(transition)
    }

    /// Checks and performs one transition. The caller holds `entry`'s lock.
    ///
    /// A rejected transition leaves `st` untouched.
    pub(crate) fn apply(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
        target: FsmState,
        cause: TransitionCause,
    ) -> Result<Transition, A2wError> {
        let from = st.state;
        let allowed = match cause {
            TransitionCause::Requested => from.can_transition_to(target),
            TransitionCause::Stop => target == FsmState::Stopped && from.can_stop(),
            TransitionCause::Terminate => target == FsmState::Terminated && from.can_terminate(),
        };
        if !allowed {
            debug!(task_id = %entry.task_id(), %from, to = %target, "rejected transition");
            return Err(A2wError::IllegalTransition {
                task_id: entry.task_id().clone(),
                from,
                to: target,
            });
        }

        let at = self.clock.now();
        st.state = target;
        st.updated_at = at;
        st.history.push(TransitionRecord {
            from,
            to: target,
            cause,
            at,
        });
        if matches!(target, FsmState::Stopped | FsmState::Terminated) {
            st.stop_requested = false;
            st.continuation = None;
            st.delegation = None;
        }
        entry.publish_state(target);
        self.broadcaster.emit(Message::StatusUpdate(StatusUpdate {
            task_id: entry.task_id().clone(),
            state: target,
            previous: Some(from),
            progress: st.progress,
            telemetry: st.telemetry.clone(),
            timestamp: at,
        }));
        info!(task_id = %entry.task_id(), %from, to = %target, ?cause, "transition");

        Ok(Transition {
            task_id: entry.task_id().clone(),
            from,
            to: target,
            cause,
            at,
        })
    }

    /// Post-transition work that must not run under the entry lock.
    pub(crate) async fn settle(&self, entry: &TaskEntry, transition: &Transition) {
        if !transition.to.is_terminal() || transition.from == transition.to {
            return;
        }
        let report = {
            let st = entry.lock().await;
            entry.report_of(&st)
        };
        if let Err(e) = self.store.put_report(report).await {
            warn!(task_id = %transition.task_id, error = %e, "failed to store report");
        }
    }

    /// Records progress and telemetry, then emits a `status_update`.
    pub async fn record_progress(
        &self,
        entry: &TaskEntry,
        progress: f64,
        telemetry: Value,
    ) -> Result<(), A2wError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(A2wError::InvalidInput(format!(
                "progress must be within [0.0, 1.0], got {progress}"
            )));
        }
        let mut st = entry.lock().await;
        if !st.state.tracks_progress() {
            return Err(A2wError::Interrupted {
                task_id: entry.task_id().clone(),
                state: st.state,
            });
        }
        if progress < st.progress {
            return Err(A2wError::InvalidInput(format!(
                "progress must not decrease ({} -> {progress})",
                st.progress
            )));
        }
        let at = self.clock.now();
        st.progress = progress;
        st.telemetry = telemetry;
        st.updated_at = at;
        self.broadcaster.emit(Message::StatusUpdate(StatusUpdate {
            task_id: entry.task_id().clone(),
            state: st.state,
            previous: None,
            progress,
            telemetry: st.telemetry.clone(),
            timestamp: at,
        }));
        Ok(())
    }

    /// Graceful stop.
    ///
    /// Tasks without a busy executor stop at once. Otherwise the executor is
    /// signalled and [`StopOutcome::Pending`] is returned.
    pub async fn request_stop(&self, task_id: &TaskId) -> Result<StopOutcome, A2wError> {
        let entry = self.registry.entry(task_id).await?;
        let outcome = {
            let mut st = entry.lock().await;
            if !st.state.can_stop() {
                return Err(A2wError::IllegalTransition {
                    task_id: task_id.clone(),
                    from: st.state,
                    to: FsmState::Stopped,
                });
            }
            let busy = st.executor_live()
                && matches!(
                    st.state,
                    FsmState::Initializing
                        | FsmState::Running
                        | FsmState::Delegating
                        | FsmState::Finishing
                );
            if busy {
                if !st.stop_requested {
                    st.stop_requested = true;
                    entry.signal(Control::Stop);
                    info!(%task_id, state = %st.state, "stop requested");
                }
                StopOutcome::Pending { state: st.state }
            } else {
                // a suspended executor is parked at a safe point already
                if let Some(executor) = st.executor.take() {
                    executor.abort();
                }
                StopOutcome::Stopped(self.apply(&entry, &mut st, FsmState::Stopped, TransitionCause::Stop)?)
            }
        };
        if let StopOutcome::Stopped(transition) = &outcome {
            self.settle(&entry, transition).await;
        }
        Ok(outcome)
    }

    /// Completes a pending stop from inside the executor, at a checkpoint.
    pub(crate) fn complete_stop(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
    ) -> Result<Transition, A2wError> {
        self.apply(entry, st, FsmState::Stopped, TransitionCause::Stop)
    }

    /// Forces a still-pending stop once the grace period is over.
    pub async fn force_stop(&self, task_id: &TaskId) -> Result<Option<Transition>, A2wError> {
        let entry = self.registry.entry(task_id).await?;
        let transition = {
            let mut st = entry.lock().await;
            if !st.stop_requested || st.state.is_terminal() {
                return Ok(None);
            }
            warn!(%task_id, state = %st.state, "stop grace period expired; aborting executor");
            if let Some(executor) = st.executor.take() {
                executor.abort();
            }
            self.apply(&entry, &mut st, FsmState::Stopped, TransitionCause::Stop)?
        };
        self.settle(&entry, &transition).await;
        Ok(Some(transition))
    }

    /// Immediate terminate from any state; repeating it is a no-op.
    pub async fn terminate(&self, task_id: &TaskId) -> Result<Transition, A2wError> {
        let entry = self.registry.entry(task_id).await?;
        let transition = {
            let mut st = entry.lock().await;
            if st.state == FsmState::Terminated {
                return Ok(Transition {
                    task_id: task_id.clone(),
                    from: FsmState::Terminated,
                    to: FsmState::Terminated,
                    cause: TransitionCause::Terminate,
                    at: st.updated_at,
                });
            }
            if let Some(executor) = st.executor.take() {
                executor.abort();
            }
            self.terminate_locked(&entry, &mut st)?
        };
        self.settle(&entry, &transition).await;
        Ok(transition)
    }

    /// Terminate without touching the executor handle. Used from inside the
    /// executor's own task, which ends on its own afterwards.
    pub(crate) fn terminate_locked(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
    ) -> Result<Transition, A2wError> {
        self.apply(entry, st, FsmState::Terminated, TransitionCause::Terminate)
    }
}
