//! Task Registry - owns every task's execution state, keyed by `task_id`.
//!
//! # Locking
//! - the map sits behind an `RwLock` that is only held for the map operation
//!   itself (insert / get / remove)
//! - each entry has its own `Mutex<ExecutionState>`; the FSM mutates state
//!   only while holding it
//! - no code path holds two entry locks at once, and nobody waits for the
//!   map lock while holding an entry lock

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use tokio::task::AbortHandle;

use crate::domain::{
    A2wError, Artifact, Continuation, DelegationChain, DelegationOutcome, DelegationRequest,
    ErrorPayload, FsmState, TaskContext, TaskId, TaskReport, TransitionRecord,
};

/// Signal sent to a live executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    Stop,
}

/// Mutable per-task state. Only reachable through [`TaskEntry::lock`].
#[derive(Debug)]
pub struct ExecutionState {
    pub state: FsmState,
    pub progress: f64,
    pub telemetry: Value,
    pub continuation: Option<Continuation>,
    pub delegation: Option<DelegationRequest>,
    pub delegation_outcome: Option<DelegationOutcome>,
    /// Insight data accumulated over the task's lifetime.
    pub insights: Map<String, Value>,
    pub ratings: Vec<f64>,
    pub artifact: Option<Artifact>,
    pub history: Vec<TransitionRecord>,
    pub stop_requested: bool,
    pub last_error: Option<ErrorPayload>,
    pub updated_at: DateTime<Utc>,
    pub(crate) executor: Option<AbortHandle>,
    /// Bumped on every executor launch; completions of older launches are ignored.
    pub(crate) generation: u64,
}

impl ExecutionState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: FsmState::Idle,
            progress: 0.0,
            telemetry: Value::Null,
            continuation: None,
            delegation: None,
            delegation_outcome: None,
            insights: Map::new(),
            ratings: Vec::new(),
            artifact: None,
            history: Vec::new(),
            stop_requested: false,
            last_error: None,
            updated_at: now,
            executor: None,
            generation: 0,
        }
    }

    pub fn executor_live(&self) -> bool {
        self.executor.is_some()
    }

    /// Clears run results before the task is admitted again.
    pub(crate) fn reset_for_rerun(&mut self) {
        self.progress = 0.0;
        self.telemetry = Value::Null;
        self.continuation = None;
        self.delegation = None;
        self.delegation_outcome = None;
        self.artifact = None;
        self.stop_requested = false;
        self.last_error = None;
    }
}

/// Handle returned by `start`; identical for every resubmission of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub task_type: String,
    pub submitted_at: DateTime<Utc>,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// First submission: a new execution was registered.
    Accepted(TaskHandle),
    /// The `task_id` was already known; nothing new was created.
    Existing(TaskHandle),
}

impl Submission {
    pub fn handle(&self) -> &TaskHandle {
        match self {
            Submission::Accepted(handle) | Submission::Existing(handle) => handle,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

/// Read-only view returned by `lookup` and `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub task_id: TaskId,
    pub task_type: String,
    pub state: FsmState,
    pub progress: f64,
    pub telemetry: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Continuation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationRequest>,
    pub delegation_chain: DelegationChain,
    pub stop_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorPayload>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct TaskEntry {
    context: TaskContext,
    submitted_at: DateTime<Utc>,
    seq: u64,
    state: Mutex<ExecutionState>,
    state_tx: watch::Sender<FsmState>,
    control_tx: watch::Sender<Control>,
}

impl TaskEntry {
    fn new(context: TaskContext, submitted_at: DateTime<Utc>, seq: u64) -> Self {
        let (state_tx, _) = watch::channel(FsmState::Idle);
        let (control_tx, _) = watch::channel(Control::Run);
        Self {
            context,
            submitted_at,
            seq,
            state: Mutex::new(ExecutionState::new(submitted_at)),
            state_tx,
            control_tx,
        }
    }

    /// The context of the first submission; never changes.
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn task_id(&self) -> &TaskId {
        &self.context.task_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            task_id: self.context.task_id.clone(),
            task_type: self.context.task_type.clone(),
            submitted_at: self.submitted_at,
            seq: self.seq,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().await
    }

    /// Follows FSM state changes without taking the entry lock.
    pub fn subscribe_state(&self) -> watch::Receiver<FsmState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_control(&self) -> watch::Receiver<Control> {
        self.control_tx.subscribe()
    }

    pub(crate) fn publish_state(&self, state: FsmState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn signal(&self, control: Control) {
        self.control_tx.send_replace(control);
    }

    pub(crate) fn snapshot_of(&self, st: &ExecutionState) -> ExecutionSnapshot {
        ExecutionSnapshot {
            task_id: self.context.task_id.clone(),
            task_type: self.context.task_type.clone(),
            state: st.state,
            progress: st.progress,
            telemetry: st.telemetry.clone(),
            suspension: st.continuation.clone(),
            delegation: st.delegation.clone(),
            delegation_chain: self.context.delegation_chain().unwrap_or_default(),
            stop_requested: st.stop_requested,
            last_error: st.last_error.clone(),
            submitted_at: self.submitted_at,
            updated_at: st.updated_at,
        }
    }

    pub(crate) fn report_of(&self, st: &ExecutionState) -> TaskReport {
        TaskReport {
            task_id: self.context.task_id.clone(),
            task_type: self.context.task_type.clone(),
            state: st.state,
            progress: st.progress,
            artifact: st.artifact.clone(),
            telemetry: st.telemetry.clone(),
            history: st.history.clone(),
            submitted_at: self.submitted_at,
            finished_at: st.updated_at,
        }
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    entries: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    next_seq: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `context` unless its `task_id` is already known.
    ///
    /// The first submission wins: a resubmission gets the original handle
    /// back, whatever its payload.
    pub async fn submit(
        &self,
        context: TaskContext,
        now: DateTime<Utc>,
    ) -> (Submission, Arc<TaskEntry>) {
        let mut entries = self.entries.write().await;
        match entries.entry(context.task_id.clone()) {
            Entry::Occupied(existing) => {
                let entry = Arc::clone(existing.get());
                (Submission::Existing(entry.handle()), entry)
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let entry = Arc::new(TaskEntry::new(context, now, seq));
                slot.insert(Arc::clone(&entry));
                (Submission::Accepted(entry.handle()), entry)
            }
        }
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<Arc<TaskEntry>> {
        self.entries.read().await.get(task_id).cloned()
    }

    pub async fn entry(&self, task_id: &TaskId) -> Result<Arc<TaskEntry>, A2wError> {
        self.get(task_id)
            .await
            .ok_or_else(|| A2wError::NotFound(task_id.clone()))
    }

    pub async fn lookup(&self, task_id: &TaskId) -> Result<ExecutionSnapshot, A2wError> {
        let entry = self.entry(task_id).await?;
        let st = entry.lock().await;
        Ok(entry.snapshot_of(&st))
    }

    /// Removes a task whose current lifecycle has ended.
    pub async fn remove(&self, task_id: &TaskId) -> Result<(), A2wError> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get(task_id) else {
            return Err(A2wError::NotFound(task_id.clone()));
        };
        let state = entry.lock().await.state;
        if !state.is_terminal() {
            return Err(A2wError::TaskActive {
                task_id: task_id.clone(),
                state,
            });
        }
        entries.remove(task_id);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
