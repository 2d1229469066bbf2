//! AgentRuntime - the facade the REST / WS surface (and embedders) talk to.
//!
//! # Lifecycle of a task
//! 1. `start` validates and registers the task, then queues it for admission
//! 2. the dispatcher pops the best candidate once an execution slot is free
//!    and calls `launch` (`idle → initializing → running`)
//! 3. the executor runs in its own tokio task; its return value is turned
//!    into `finishing → finished`, or routed as a failure
//!
//! Cheap to clone; every clone shares the same state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::broadcaster::{Channel, StatusBroadcaster};
use crate::app::context::ExecutionContext;
use crate::app::delegation::DelegationManager;
use crate::app::dispatcher::Dispatcher;
use crate::app::exchange::NeedInsightExchange;
use crate::app::fsm::{FsmEngine, StopOutcome, Transition};
use crate::app::registry::{
    Control, ExecutionSnapshot, ExecutionState, Submission, TaskEntry, TaskHandle, TaskRegistry,
};
use crate::app::reporter::ErrorReporter;
use crate::app::scheduler::{AdmissionQueue, Candidate, WeightedScheduler};
use crate::config::RuntimeConfig;
use crate::domain::{
    A2W_VERSION, A2wError, AgentEvent, AgentId, AgentRecord, Artifact, DelegationOutcome,
    DelegationRequest, Envelope, FsmState, InsightAck, LogPage, Manifest, Message, NeedSignal,
    Permissions, StatusUpdate, SubscriberId, TaskContext, TaskId, TaskReport, TransitionCause,
    Urgency, Weight,
};
use crate::exec::ExecutorRegistry;
use crate::ports::{
    Ability, AbilityRegistry, Clock, DelegationTransport, IdGenerator, ReportStore,
};

pub const DEFAULT_LOG_PAGE: usize = 100;
pub const MAX_LOG_PAGE: usize = 1000;

/// Body of `POST /stop` and `POST /terminate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub task_id: TaskId,
    /// Weight of whoever asks; defaults to this agent's own weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_weight: Option<Weight>,
    #[serde(default, rename = "override")]
    pub override_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl InterruptRequest {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            requester_weight: None,
            override_flag: false,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopAck {
    pub task_id: TaskId,
    pub state: FsmState,
    /// The executor was asked to stop and has not reached a safe point yet.
    pub pending: bool,
}

/// Body of `POST /weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub weight: Weight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightChange {
    pub previous: Weight,
    pub weight: Weight,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) agent: Arc<AgentRecord>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) fsm: Arc<FsmEngine>,
    pub(crate) exchange: NeedInsightExchange,
    pub(crate) scheduler: WeightedScheduler,
    pub(crate) admission: AdmissionQueue,
    pub(crate) delegation: DelegationManager,
    pub(crate) broadcaster: Arc<StatusBroadcaster>,
    pub(crate) reporter: ErrorReporter,
    pub(crate) executors: ExecutorRegistry,
    pub(crate) abilities: Arc<dyn AbilityRegistry>,
    pub(crate) store: Arc<dyn ReportStore>,
    pub(crate) transport: Option<Arc<dyn DelegationTransport>>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) slots: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

/// Background tasks started by [`AgentRuntime::spawn_workers`].
pub struct RuntimeWorkers {
    dispatcher: Dispatcher,
    log_sink: JoinHandle<()>,
}

impl RuntimeWorkers {
    /// Stops admitting new tasks. Running executors are left alone.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown_and_join().await;
        self.log_sink.abort();
    }
}

impl AgentRuntime {
    pub(crate) fn from_inner(inner: RuntimeInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn agent_id(&self) -> &AgentId {
        self.inner.agent.agent_id()
    }

    pub fn weight(&self) -> Weight {
        self.inner.agent.weight()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.inner.broadcaster
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.inner.reporter
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn scheduler(&self) -> &WeightedScheduler {
        &self.inner.scheduler
    }

    pub(crate) fn fsm(&self) -> &FsmEngine {
        &self.inner.fsm
    }

    pub(crate) fn exchange(&self) -> &NeedInsightExchange {
        &self.inner.exchange
    }

    pub(crate) fn transport(&self) -> Option<&Arc<dyn DelegationTransport>> {
        self.inner.transport.as_ref()
    }

    pub(crate) fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.inner.slots)
    }

    // ========================================
    // Discovery
    // ========================================

    pub fn manifest(&self) -> Manifest {
        Manifest {
            agent_id: self.agent_id().clone(),
            weight: self.weight(),
            a2w_version: A2W_VERSION.to_string(),
            task_types: self.inner.executors.registered_types(),
            permissions: Permissions {
                allowed_callers: self.inner.agent.allowed_callers().clone(),
                allowed_callees: self.inner.agent.allowed_callees().clone(),
            },
        }
    }

    /// Configured abilities first, then one per executor not already listed.
    pub fn capabilities(&self) -> Vec<Ability> {
        let mut abilities = self.inner.abilities.abilities();
        let mut seen: BTreeSet<String> = abilities.iter().map(|a| a.name.clone()).collect();
        for ability in self.inner.executors.abilities() {
            if seen.insert(ability.name.clone()) {
                abilities.push(ability);
            }
        }
        abilities
    }

    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Envelope> {
        self.inner.broadcaster.subscribe(channel)
    }

    /// Fresh identifier for one push-channel connection.
    pub fn next_subscriber_id(&self) -> SubscriberId {
        self.inner.ids.generate_subscriber_id()
    }

    // ========================================
    // Task lifecycle
    // ========================================

    /// Registers a task and queues it for admission.
    ///
    /// A known `task_id` is answered with the original handle before any
    /// validation, whatever the new payload says.
    pub async fn start(&self, context: TaskContext) -> Result<Submission, A2wError> {
        if let Some(entry) = self.inner.registry.get(&context.task_id).await {
            debug!(task_id = %context.task_id, "duplicate submission");
            return Ok(Submission::Existing(entry.handle()));
        }

        let now = self.inner.clock.now();
        context.validate(now)?;
        let executor = self.inner.executors.get(&context.task_type).ok_or_else(|| {
            A2wError::InvalidInput(format!(
                "no executor registered for task type '{}'",
                context.task_type
            ))
        })?;
        executor.check_payload(&context.payload)?;
        self.inner.delegation.check_inbound(&context)?;

        let retry_of = context.retry_of.clone();
        let (submission, entry) = self.inner.registry.submit(context, now).await;
        if !submission.is_new() {
            return Ok(submission);
        }
        // a report left by a removed task with the same id is stale now
        self.inner.store.remove_report(entry.task_id()).await?;

        self.inner.broadcaster.emit(Message::StatusUpdate(StatusUpdate {
            task_id: entry.task_id().clone(),
            state: FsmState::Idle,
            previous: None,
            progress: 0.0,
            telemetry: Value::Null,
            timestamp: now,
        }));
        if let Some(retry_of) = retry_of
            && self.inner.registry.get(&retry_of).await.is_some()
        {
            self.inner.broadcaster.emit_event(AgentEvent::TaskRetried {
                task_id: entry.task_id().clone(),
                retry_of,
                timestamp: now,
            });
        }
        info!(
            task_id = %entry.task_id(),
            task_type = %entry.context().task_type,
            caller = ?entry.context().caller_agent.as_ref().map(AgentId::as_str),
            "task accepted"
        );
        self.admit(&entry).await;
        Ok(submission)
    }

    async fn admit(&self, entry: &TaskEntry) {
        let context = entry.context();
        let score = self
            .inner
            .scheduler
            .score(context.weight_caller, context.priority);
        self.inner
            .admission
            .push(Candidate {
                task_id: entry.task_id().clone(),
                score,
                submitted_at: entry.submitted_at(),
                seq: entry.seq(),
            })
            .await;
        debug!(task_id = %entry.task_id(), score, "queued for admission");
    }

    pub async fn status(&self, task_id: &TaskId) -> Result<ExecutionSnapshot, A2wError> {
        self.inner.registry.lookup(task_id).await
    }

    /// Ordinary FSM transition requested from outside the executor.
    pub async fn transition(
        &self,
        task_id: &TaskId,
        target: FsmState,
    ) -> Result<Transition, A2wError> {
        self.inner.fsm.transition(task_id, target).await
    }

    /// Graceful stop; see [`FsmEngine::request_stop`].
    ///
    /// A pending stop is forced once `stop_grace_ms` has passed.
    pub async fn stop(&self, request: InterruptRequest) -> Result<StopAck, A2wError> {
        self.authorize_interrupt(&request).await?;
        match self.inner.fsm.request_stop(&request.task_id).await? {
            StopOutcome::Stopped(transition) => Ok(StopAck {
                task_id: request.task_id,
                state: transition.to,
                pending: false,
            }),
            StopOutcome::Pending { state } => {
                let runtime = self.clone();
                let task_id = request.task_id.clone();
                let grace = self.inner.config.stop_grace();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Err(e) = runtime.inner.fsm.force_stop(&task_id).await {
                        warn!(%task_id, error = %e, "forced stop failed");
                    }
                });
                Ok(StopAck {
                    task_id: request.task_id,
                    state,
                    pending: true,
                })
            }
        }
    }

    /// Immediate terminate; repeating it is a no-op.
    pub async fn terminate(&self, request: InterruptRequest) -> Result<Transition, A2wError> {
        self.authorize_interrupt(&request).await?;
        if let Some(reason) = &request.reason {
            info!(task_id = %request.task_id, %reason, "terminate requested");
        }
        self.inner.fsm.terminate(&request.task_id).await
    }

    async fn authorize_interrupt(&self, request: &InterruptRequest) -> Result<(), A2wError> {
        let entry = self.inner.registry.entry(&request.task_id).await?;
        let requester = request.requester_weight.unwrap_or_else(|| self.weight());
        self.inner.scheduler.authorize_interrupt(
            entry.context().weight_caller,
            requester,
            request.override_flag,
        )
    }

    /// Result of a task whose lifecycle has ended.
    ///
    /// A live task answers from its own state; the store only serves tasks
    /// that were removed from the registry.
    pub async fn report(&self, task_id: &TaskId) -> Result<TaskReport, A2wError> {
        let Some(entry) = self.inner.registry.get(task_id).await else {
            return self
                .inner
                .store
                .get_report(task_id)
                .await?
                .ok_or_else(|| A2wError::NotFound(task_id.clone()));
        };
        let st = entry.lock().await;
        if st.state.is_terminal() {
            Ok(entry.report_of(&st))
        } else {
            Err(A2wError::ReportPending(task_id.clone()))
        }
    }

    /// Log entries after `cursor`; `limit` is capped at [`MAX_LOG_PAGE`].
    pub async fn logs(&self, cursor: u64, limit: usize) -> Result<LogPage, A2wError> {
        if limit == 0 {
            return Err(A2wError::InvalidInput("limit must be at least 1".into()));
        }
        self.inner
            .store
            .read_logs(cursor, limit.min(MAX_LOG_PAGE))
            .await
    }

    /// Runs a finished task again: `finished → idle`, then back into the
    /// admission queue.
    pub async fn reset(&self, task_id: &TaskId) -> Result<TaskHandle, A2wError> {
        let entry = self.inner.registry.entry(task_id).await?;
        {
            let mut st = entry.lock().await;
            if st.state != FsmState::Finished {
                return Err(A2wError::IllegalTransition {
                    task_id: task_id.clone(),
                    from: st.state,
                    to: FsmState::Idle,
                });
            }
            st.reset_for_rerun();
            self.inner
                .fsm
                .apply(&entry, &mut st, FsmState::Idle, TransitionCause::Requested)?;
            entry.signal(Control::Run);
        }
        self.inner.store.remove_report(task_id).await?;
        info!(%task_id, "task reset");
        self.admit(&entry).await;
        Ok(entry.handle())
    }

    /// Drops a task whose lifecycle has ended. Its stored report is kept.
    pub async fn remove(&self, task_id: &TaskId) -> Result<(), A2wError> {
        self.inner.registry.remove(task_id).await?;
        info!(%task_id, "task removed");
        Ok(())
    }

    // ========================================
    // Needs and insight
    // ========================================

    pub async fn raise_need(
        &self,
        task_id: &TaskId,
        required: BTreeSet<String>,
        urgency: Urgency,
        description: impl Into<String>,
    ) -> Result<NeedSignal, A2wError> {
        self.inner
            .exchange
            .raise_need(task_id, required, urgency, description)
            .await
    }

    /// Delivers insight; relaunches the executor when the task resumed
    /// without one.
    pub async fn provide_insight(
        &self,
        task_id: &TaskId,
        payload: Map<String, Value>,
        rating: Option<f64>,
    ) -> Result<InsightAck, A2wError> {
        let delivery = self
            .inner
            .exchange
            .provide_insight(task_id, payload, rating)
            .await?;
        if delivery.relaunch {
            let entry = self.inner.registry.entry(task_id).await?;
            info!(%task_id, "relaunching executor with delivered insight");
            self.spawn_execution(entry, None).await;
        }
        Ok(delivery.ack)
    }

    // ========================================
    // Weight
    // ========================================

    pub fn update_weight(&self, update: WeightUpdate) -> Result<WeightChange, A2wError> {
        if let Some(expected) = &self.inner.config.weight_update_token
            && update.token.as_deref() != Some(expected.as_str())
        {
            return Err(A2wError::PermissionDenied(
                "weight update token does not match".into(),
            ));
        }
        let previous = self.inner.agent.set_weight(update.weight);
        self.inner.broadcaster.emit_event(AgentEvent::WeightUpdate {
            previous,
            weight: update.weight,
            timestamp: self.inner.clock.now(),
        });
        info!(%previous, weight = %update.weight, "agent weight updated");
        Ok(WeightChange {
            previous,
            weight: update.weight,
        })
    }

    // ========================================
    // Delegation
    // ========================================

    /// Moves a running task to `delegating` and returns the request to send.
    pub async fn delegate(
        &self,
        task_id: &TaskId,
        delegate_to: &AgentId,
        reason: impl Into<String>,
    ) -> Result<DelegationRequest, A2wError> {
        let entry = self.inner.registry.entry(task_id).await?;
        let mut st = entry.lock().await;
        if st.state != FsmState::Running {
            return Err(A2wError::IllegalTransition {
                task_id: task_id.clone(),
                from: st.state,
                to: FsmState::Delegating,
            });
        }
        let request = self
            .inner
            .delegation
            .build(entry.context(), delegate_to, reason)?;
        let chain = request.task.delegation_chain()?;
        self.inner.fsm.apply(
            &entry,
            &mut st,
            FsmState::Delegating,
            TransitionCause::Requested,
        )?;
        st.delegation = Some(request.clone());
        st.delegation_outcome = None;

        self.inner
            .broadcaster
            .emit_event(AgentEvent::DelegationStarted {
                task_id: task_id.clone(),
                delegation_id: request.delegation_id.clone(),
                delegate_to: request.delegate_to.clone(),
                reason: request.reason.clone(),
                chain,
                timestamp: request.created_at,
            });
        Ok(request)
    }

    /// Applies the delegate's answer to a `delegating` task and returns the
    /// state it ends up in.
    pub async fn resolve_delegation(
        &self,
        task_id: &TaskId,
        outcome: DelegationOutcome,
    ) -> Result<FsmState, A2wError> {
        let entry = self.inner.registry.entry(task_id).await?;
        let (state, settled) = {
            let mut st = entry.lock().await;
            if st.state != FsmState::Delegating {
                return Err(A2wError::IllegalTransition {
                    task_id: task_id.clone(),
                    from: st.state,
                    to: outcome.target_state(),
                });
            }
            let Some(request) = st.delegation.clone() else {
                return Err(A2wError::Internal(format!(
                    "task {task_id} is delegating without a delegation request"
                )));
            };

            let settled = match &outcome {
                DelegationOutcome::Accepted { .. } | DelegationOutcome::Rejected { .. } => {
                    self.inner.fsm.apply(
                        &entry,
                        &mut st,
                        FsmState::Running,
                        TransitionCause::Requested,
                    )?;
                    None
                }
                DelegationOutcome::NeedsInput {
                    required,
                    description,
                } => {
                    self.inner.exchange.suspend(
                        &entry,
                        &mut st,
                        required.clone(),
                        Urgency::default(),
                        description.clone(),
                    )?;
                    None
                }
                DelegationOutcome::Failed { .. } => {
                    Some(self.inner.fsm.terminate_locked(&entry, &mut st)?)
                }
            };
            st.delegation = None;
            st.delegation_outcome = Some(outcome.clone());

            info!(
                %task_id,
                delegation_id = %request.delegation_id,
                outcome = outcome.label(),
                "delegation finished"
            );
            self.inner
                .broadcaster
                .emit_event(AgentEvent::DelegationFinished {
                    task_id: task_id.clone(),
                    delegation_id: request.delegation_id,
                    delegate_to: request.delegate_to,
                    outcome,
                    timestamp: self.inner.clock.now(),
                });
            (st.state, settled)
        };
        if let Some(transition) = settled {
            self.inner.fsm.settle(&entry, &transition).await;
        }
        Ok(state)
    }

    // ========================================
    // Execution
    // ========================================

    /// Starts the dispatcher and the log sink.
    pub fn spawn_workers(&self) -> RuntimeWorkers {
        RuntimeWorkers {
            dispatcher: Dispatcher::spawn(self.clone()),
            log_sink: self
                .inner
                .broadcaster
                .spawn_log_sink(Arc::clone(&self.inner.store)),
        }
    }

    pub(crate) async fn next_admission(&self) -> Candidate {
        self.inner.admission.next().await
    }

    pub(crate) async fn requeue(&self, candidate: Candidate) {
        self.inner.admission.push(candidate).await;
    }

    /// Runs an admitted task: `idle → initializing → running`, then the
    /// executor. Candidates that left `idle` while queued are skipped.
    pub(crate) async fn launch(&self, task_id: &TaskId, permit: OwnedSemaphorePermit) {
        let Some(entry) = self.inner.registry.get(task_id).await else {
            debug!(%task_id, "admitted task is gone");
            return;
        };
        {
            let mut st = entry.lock().await;
            if st.state != FsmState::Idle {
                debug!(%task_id, state = %st.state, "admitted task is no longer idle");
                return;
            }
            for target in [FsmState::Initializing, FsmState::Running] {
                if let Err(e) =
                    self.inner
                        .fsm
                        .apply(&entry, &mut st, target, TransitionCause::Requested)
                {
                    warn!(%task_id, error = %e, "launch failed");
                    return;
                }
            }
        }
        self.spawn_execution(entry, Some(permit)).await;
    }

    /// Spawns the executor of a `running` task that has none.
    pub(crate) async fn spawn_execution(
        &self,
        entry: Arc<TaskEntry>,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let mut st = entry.lock().await;
        if st.state != FsmState::Running || st.executor_live() {
            return;
        }
        st.generation += 1;
        let generation = st.generation;
        let runtime = self.clone();
        let task_entry = Arc::clone(&entry);
        let join = tokio::spawn(async move {
            let result = runtime.run_executor(&task_entry, permit).await;
            runtime
                .complete_execution(&task_entry, generation, result)
                .await;
        });
        st.executor = Some(join.abort_handle());
        debug!(task_id = %entry.task_id(), generation, "executor spawned");
    }

    async fn run_executor(
        &self,
        entry: &Arc<TaskEntry>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Artifact, A2wError> {
        let context = entry.context();
        let executor = self.inner.executors.get(&context.task_type).ok_or_else(|| {
            A2wError::Internal(format!(
                "no executor registered for task type '{}'",
                context.task_type
            ))
        })?;
        let ctx = ExecutionContext::new(self.clone(), Arc::clone(entry), permit);
        ctx.ensure_slot().await?;

        let run = executor.execute_dyn(context.payload.clone(), &ctx);
        match context.deadline {
            Some(deadline) => {
                let remaining = (deadline - self.inner.clock.now())
                    .to_std()
                    .unwrap_or_default();
                tokio::time::timeout(remaining, run).await.map_err(|_| {
                    A2wError::Timeout(format!(
                        "task {} passed its deadline {}",
                        context.task_id,
                        deadline.to_rfc3339()
                    ))
                })?
            }
            None => run.await,
        }
    }

    /// Turns the executor's return value into FSM transitions.
    pub(crate) async fn complete_execution(
        &self,
        entry: &TaskEntry,
        generation: u64,
        result: Result<Artifact, A2wError>,
    ) {
        let settled = {
            let mut st = entry.lock().await;
            if st.generation != generation {
                debug!(task_id = %entry.task_id(), generation, "ignoring stale executor result");
                return;
            }
            st.executor = None;
            if st.state.is_terminal() {
                return;
            }
            let outcome = if st.stop_requested {
                self.inner.fsm.complete_stop(entry, &mut st).map(Some)
            } else {
                match result {
                    Ok(artifact) => self.finish(entry, &mut st, artifact),
                    Err(err) => self.route_failure(entry, &mut st, err),
                }
            };
            outcome.unwrap_or_else(|e| {
                warn!(task_id = %entry.task_id(), error = %e, "could not record executor result");
                None
            })
        };
        if let Some(transition) = settled {
            self.inner.fsm.settle(entry, &transition).await;
        }
    }

    fn finish(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
        artifact: Artifact,
    ) -> Result<Option<Transition>, A2wError> {
        if st.state != FsmState::Running {
            let err = A2wError::Internal(format!("executor returned while task is {}", st.state));
            return self.route_failure(entry, st, err);
        }
        st.artifact = Some(artifact);
        st.progress = 1.0;
        self.inner
            .fsm
            .apply(entry, st, FsmState::Finishing, TransitionCause::Requested)?;
        let transition =
            self.inner
                .fsm
                .apply(entry, st, FsmState::Finished, TransitionCause::Requested)?;
        Ok(Some(transition))
    }

    /// Executor failure: pushed on `/ws/errors`, then
    /// - `MissingData` → `blocked → waiting` with a need for the keys
    /// - other recoverable errors → `blocked`
    /// - the rest → `terminated`
    ///
    /// Errors that say nothing about viability (cycle, illegal transition,
    /// bad input) are reported as `E001` and end the task.
    fn route_failure(
        &self,
        entry: &TaskEntry,
        st: &mut ExecutionState,
        err: A2wError,
    ) -> Result<Option<Transition>, A2wError> {
        let err = if err.affects_viability() {
            err
        } else {
            A2wError::Internal(format!("executor failed: {err}"))
        };
        let payload = self.inner.reporter.push(&err, Some(entry.task_id()));
        st.last_error = Some(payload);

        let can_block = st.state.can_transition_to(FsmState::Blocked);
        match err {
            A2wError::MissingData { required, message } if can_block => {
                self.inner
                    .fsm
                    .apply(entry, st, FsmState::Blocked, TransitionCause::Requested)?;
                st.continuation = None;
                self.inner
                    .exchange
                    .suspend(entry, st, required, Urgency::High, message)?;
                Ok(None)
            }
            err if err.recoverable() && can_block => {
                self.inner
                    .fsm
                    .apply(entry, st, FsmState::Blocked, TransitionCause::Requested)?;
                st.continuation = None;
                Ok(None)
            }
            _ => Ok(Some(self.inner.fsm.terminate_locked(entry, st)?)),
        }
    }
}
