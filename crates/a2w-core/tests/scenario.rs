//! End-to-end lifecycles driven through `AgentRuntime` with the dispatcher running.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::sync::broadcast;

use a2w_core::app::{Channel, InterruptRequest};
use a2w_core::domain::{
    A2wError, AgentEvent, AgentId, Artifact, DelegationOutcome, Envelope, ErrorCode, FsmState,
    Message, TaskContext, TaskId, Urgency,
};
use a2w_core::{AgentRuntime, ExecutionContext, Executor, RuntimeBuilder, RuntimeConfig, Task};

// ========================================
// Executors
// ========================================

#[derive(Serialize, Deserialize)]
struct Research {
    topic: String,
}

impl Task for Research {
    const TYPE: &'static str = "test.research.v1";
}

struct Researcher;

#[async_trait]
impl Executor<Research> for Researcher {
    async fn execute(&self, task: Research, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        ctx.report_progress(0.2, json!({ "phase": "collect" })).await?;
        let insights = ctx
            .need(["market_trends"], Urgency::High, "trend data")
            .await?;
        ctx.report_progress(0.8, json!({ "phase": "write" })).await?;
        Ok(Artifact::Json(json!({
            "topic": task.topic,
            "trends": insights["market_trends"],
        })))
    }
}

#[derive(Serialize, Deserialize)]
struct Spin {}

impl Task for Spin {
    const TYPE: &'static str = "test.spin.v1";
}

/// Runs until stopped, checking in at every step.
struct Spinner;

#[async_trait]
impl Executor<Spin> for Spinner {
    async fn execute(&self, _task: Spin, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        loop {
            ctx.checkpoint().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Hang {}

impl Task for Hang {
    const TYPE: &'static str = "test.hang.v1";
}

/// Never returns and never checks in.
struct Hanger;

#[async_trait]
impl Executor<Hang> for Hanger {
    async fn execute(&self, _task: Hang, _ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        std::future::pending::<()>().await;
        Ok(Artifact::Text("unreachable".into()))
    }
}

#[derive(Serialize, Deserialize)]
struct NeedsKey {
    key: String,
}

impl Task for NeedsKey {
    const TYPE: &'static str = "test.needs_key.v1";
}

/// Fails with missing data until insight carries `key`.
struct KeyChecker;

#[async_trait]
impl Executor<NeedsKey> for KeyChecker {
    async fn execute(&self, task: NeedsKey, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        match ctx.insights().await.get(&task.key) {
            Some(value) => Ok(Artifact::Json(value.clone())),
            None => Err(A2wError::missing_data([task.key])),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Handoff {
    to: String,
}

impl Task for Handoff {
    const TYPE: &'static str = "test.handoff.v1";
}

struct HandoffExecutor;

#[async_trait]
impl Executor<Handoff> for HandoffExecutor {
    async fn execute(&self, task: Handoff, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        let to = AgentId::new(task.to).map_err(|e| A2wError::InvalidInput(e.to_string()))?;
        let outcome = ctx.delegate(&to, "needs a specialist").await?;
        let insights = ctx.insights().await;
        Ok(Artifact::Json(json!({
            "outcome": outcome.label(),
            "insights": Value::Object(insights),
        })))
    }
}

#[derive(Serialize, Deserialize)]
struct Echo {
    text: String,
}

impl Task for Echo {
    const TYPE: &'static str = "test.echo.v1";
}

struct EchoExecutor;

#[async_trait]
impl Executor<Echo> for EchoExecutor {
    async fn execute(&self, task: Echo, _ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        Ok(Artifact::Text(task.text))
    }
}

#[derive(Serialize, Deserialize)]
struct Upstream {}

impl Task for Upstream {
    const TYPE: &'static str = "test.upstream.v1";
}

/// Fails the way an unreachable downstream service would.
struct UpstreamDown;

#[async_trait]
impl Executor<Upstream> for UpstreamDown {
    async fn execute(&self, _task: Upstream, _ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        Err(A2wError::ExternalDependency("search backend unreachable".into()))
    }
}

// ========================================
// Helpers
// ========================================

fn config() -> RuntimeConfig {
    RuntimeConfig {
        agent_id: "agent-a".into(),
        allowed_callees: [AgentId::new("agent-b").unwrap()].into_iter().collect(),
        stop_grace_ms: 2_000,
        ..Default::default()
    }
}

fn runtime_with(config: RuntimeConfig) -> AgentRuntime {
    RuntimeBuilder::new(config)
        .register::<Research, _>(Researcher)
        .unwrap()
        .register::<Spin, _>(Spinner)
        .unwrap()
        .register::<Hang, _>(Hanger)
        .unwrap()
        .register::<NeedsKey, _>(KeyChecker)
        .unwrap()
        .register::<Handoff, _>(HandoffExecutor)
        .unwrap()
        .register::<Echo, _>(EchoExecutor)
        .unwrap()
        .register::<Upstream, _>(UpstreamDown)
        .unwrap()
        .build()
        .unwrap()
}

fn runtime() -> AgentRuntime {
    runtime_with(config())
}

fn id(value: &str) -> TaskId {
    TaskId::new(value).unwrap()
}

fn task(task_id: &str, task_type: &str, payload: Value) -> TaskContext {
    TaskContext::new(id(task_id), task_type).with_payload(payload)
}

fn insight(pairs: Value) -> Map<String, Value> {
    match pairs {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn wait_for_state(runtime: &AgentRuntime, task_id: &TaskId, state: FsmState) {
    let reached = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(snapshot) = runtime.status(task_id).await
                && snapshot.state == state
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    let current = runtime.status(task_id).await.map(|s| s.state);
    assert!(
        reached.is_ok(),
        "task {task_id} never reached {state}; currently {current:?}"
    );
}

async fn next_matching<F>(rx: &mut broadcast::Receiver<Envelope>, mut pred: F) -> Envelope
where
    F: FnMut(&Envelope) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let envelope = rx.recv().await.unwrap();
            if pred(&envelope) {
                return envelope;
            }
        }
    })
    .await
    .unwrap()
}

// ========================================
// Lifecycles
// ========================================

#[tokio::test]
async fn need_insight_finish_report() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut needs = runtime.subscribe(Channel::Needs);
    let mut status = runtime.subscribe(Channel::Status);
    let t = id("T-research");

    runtime
        .start(task("T-research", Research::TYPE, json!({ "topic": "ev batteries" })))
        .await
        .unwrap();

    let envelope = next_matching(&mut needs, |_| true).await;
    let Message::NeedData(signal) = envelope.message else {
        panic!("expected need_data");
    };
    assert_eq!(signal.task_id, t);
    assert!(signal.required.contains("market_trends"));
    assert_eq!(signal.urgency, Urgency::High);
    wait_for_state(&runtime, &t, FsmState::Waiting).await;

    let ack = runtime
        .provide_insight(&t, insight(json!({ "market_trends": ["solid-state"] })), Some(0.9))
        .await
        .unwrap();
    assert!(ack.resumed);
    assert_eq!(ack.state, FsmState::Running);

    wait_for_state(&runtime, &t, FsmState::Finished).await;
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.state, FsmState::Finished);
    assert_eq!(report.progress, 1.0);
    assert_eq!(
        report.artifact,
        Some(Artifact::Json(json!({
            "topic": "ev batteries",
            "trends": ["solid-state"],
        })))
    );

    // every state change went out on /ws/status, in FSM order
    let mut seen = Vec::new();
    while let Ok(envelope) = status.try_recv() {
        if let Message::StatusUpdate(update) = envelope.message
            && seen.last() != Some(&update.state)
        {
            seen.push(update.state);
        }
    }
    assert_eq!(
        seen,
        vec![
            FsmState::Idle,
            FsmState::Initializing,
            FsmState::Running,
            FsmState::Waiting,
            FsmState::Running,
            FsmState::Finishing,
            FsmState::Finished,
        ]
    );

    workers.shutdown().await;
}

#[tokio::test]
async fn partial_insight_keeps_waiting_by_default() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-partial");
    runtime
        .start(task("T-partial", Research::TYPE, json!({ "topic": "x" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Waiting).await;

    let ack = runtime
        .provide_insight(&t, insight(json!({ "unrelated": 1 })), None)
        .await
        .unwrap();
    assert!(!ack.resumed);
    assert_eq!(ack.state, FsmState::Waiting);
    assert!(ack.outstanding.contains("market_trends"));

    let err = runtime
        .provide_insight(&t, insight(json!({ "market_trends": [] })), Some(1.5))
        .await
        .unwrap_err();
    assert!(matches!(err, A2wError::InvalidInput(_)));

    workers.shutdown().await;
}

#[tokio::test]
async fn duplicate_start_creates_nothing_new() {
    let runtime = runtime();
    let first = runtime
        .start(task("T-dup", Echo::TYPE, json!({ "text": "a" })))
        .await
        .unwrap();
    let second = runtime
        .start(task("T-dup", Echo::TYPE, json!({ "text": "b" })))
        .await
        .unwrap();
    assert!(first.is_new());
    assert!(!second.is_new());
    assert_eq!(first.handle(), second.handle());
    assert_eq!(runtime.registry().len().await, 1);
}

#[tokio::test]
async fn graceful_stop_completes_at_a_checkpoint() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-spin");
    runtime
        .start(task("T-spin", Spin::TYPE, json!({})))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Running).await;

    let ack = runtime.stop(InterruptRequest::new(t.clone())).await.unwrap();
    assert!(ack.pending);

    wait_for_state(&runtime, &t, FsmState::Stopped).await;
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.state, FsmState::Stopped);

    let err = runtime.stop(InterruptRequest::new(t.clone())).await.unwrap_err();
    assert!(matches!(err, A2wError::IllegalTransition { .. }));

    workers.shutdown().await;
}

#[tokio::test]
async fn stop_without_checkpoint_is_forced_after_grace() {
    let runtime = runtime_with(RuntimeConfig {
        stop_grace_ms: 50,
        ..config()
    });
    let workers = runtime.spawn_workers();
    let t = id("T-hang-stop");
    runtime
        .start(task("T-hang-stop", Hang::TYPE, json!({})))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Running).await;

    let ack = runtime.stop(InterruptRequest::new(t.clone())).await.unwrap();
    assert!(ack.pending);
    wait_for_state(&runtime, &t, FsmState::Stopped).await;

    workers.shutdown().await;
}

#[tokio::test]
async fn terminate_is_immediate_and_repeatable() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-hang");
    runtime
        .start(task("T-hang", Hang::TYPE, json!({})))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Running).await;

    let first = runtime
        .terminate(InterruptRequest::new(t.clone()))
        .await
        .unwrap();
    assert_eq!(first.to, FsmState::Terminated);
    let second = runtime
        .terminate(InterruptRequest::new(t.clone()))
        .await
        .unwrap();
    assert_eq!(second.to, FsmState::Terminated);

    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.state, FsmState::Terminated);

    workers.shutdown().await;
}

#[tokio::test]
async fn missing_data_blocks_then_relaunches_on_insight() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut errors = runtime.subscribe(Channel::Errors);
    let t = id("T-key");
    runtime
        .start(task("T-key", NeedsKey::TYPE, json!({ "key": "api_token" })))
        .await
        .unwrap();

    let envelope = next_matching(&mut errors, |_| true).await;
    let Message::Error(payload) = envelope.message else {
        panic!("expected error");
    };
    assert_eq!(payload.code, ErrorCode::MissingData);
    assert_eq!(payload.task_id, Some(t.clone()));

    wait_for_state(&runtime, &t, FsmState::Waiting).await;
    let snapshot = runtime.status(&t).await.unwrap();
    let suspension = snapshot.suspension.unwrap();
    assert!(suspension.required.contains("api_token"));
    assert_eq!(suspension.urgency, Urgency::High);
    assert_eq!(
        snapshot.last_error.map(|e| e.code),
        Some(ErrorCode::MissingData)
    );

    runtime
        .provide_insight(&t, insight(json!({ "api_token": "abc" })), None)
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.artifact, Some(Artifact::Json(json!("abc"))));

    workers.shutdown().await;
}

#[tokio::test]
async fn deadline_expiry_blocks_with_timeout() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-deadline");
    let mut context = task("T-deadline", Hang::TYPE, json!({}));
    context.deadline = Some(Utc::now() + chrono::Duration::milliseconds(100));
    runtime.start(context).await.unwrap();

    wait_for_state(&runtime, &t, FsmState::Blocked).await;
    let snapshot = runtime.status(&t).await.unwrap();
    assert_eq!(snapshot.last_error.map(|e| e.code), Some(ErrorCode::Timeout));

    workers.shutdown().await;
}

#[tokio::test]
async fn past_deadline_is_refused_at_start() {
    let runtime = runtime();
    let mut context = task("T-late", Echo::TYPE, json!({ "text": "x" }));
    context.deadline = Some(Utc::now() - chrono::Duration::seconds(1));
    let err = runtime.start(context).await.unwrap_err();
    assert!(matches!(err, A2wError::InvalidInput(_)));
    assert!(runtime.status(&id("T-late")).await.is_err());
}

#[tokio::test]
async fn delegation_resolved_externally() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut events = runtime.subscribe(Channel::Events);
    let t = id("T-handoff");
    runtime
        .start(task("T-handoff", Handoff::TYPE, json!({ "to": "agent-b" })))
        .await
        .unwrap();

    let started = next_matching(&mut events, |e| {
        matches!(&e.message, Message::Event(AgentEvent::DelegationStarted { .. }))
    })
    .await;
    let Message::Event(AgentEvent::DelegationStarted { delegate_to, chain, .. }) = started.message
    else {
        unreachable!();
    };
    assert_eq!(delegate_to.as_str(), "agent-b");
    assert_eq!(chain.agents(), &[AgentId::new("agent-a").unwrap()]);
    wait_for_state(&runtime, &t, FsmState::Delegating).await;

    let state = runtime
        .resolve_delegation(&t, DelegationOutcome::Accepted { result: None })
        .await
        .unwrap();
    assert_eq!(state, FsmState::Running);
    next_matching(&mut events, |e| {
        matches!(&e.message, Message::Event(AgentEvent::DelegationFinished { .. }))
    })
    .await;

    wait_for_state(&runtime, &t, FsmState::Finished).await;
    let report = runtime.report(&t).await.unwrap();
    let Some(Artifact::Json(artifact)) = report.artifact else {
        panic!("expected json artifact");
    };
    assert_eq!(artifact["outcome"], "accepted");

    workers.shutdown().await;
}

#[tokio::test]
async fn delegation_needing_input_waits_for_insight() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-handoff-input");
    runtime
        .start(task("T-handoff-input", Handoff::TYPE, json!({ "to": "agent-b" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Delegating).await;

    let state = runtime
        .resolve_delegation(
            &t,
            DelegationOutcome::NeedsInput {
                required: ["budget".to_string()].into_iter().collect(),
                description: "how much may be spent".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(state, FsmState::Waiting);

    runtime
        .provide_insight(&t, insight(json!({ "budget": 1000 })), None)
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;
    let report = runtime.report(&t).await.unwrap();
    let Some(Artifact::Json(artifact)) = report.artifact else {
        panic!("expected json artifact");
    };
    assert_eq!(artifact["outcome"], "needs_input");
    assert_eq!(artifact["insights"]["budget"], 1000);

    workers.shutdown().await;
}

#[tokio::test]
async fn failed_delegation_terminates_the_task() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-handoff-fail");
    runtime
        .start(task("T-handoff-fail", Handoff::TYPE, json!({ "to": "agent-b" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Delegating).await;

    let state = runtime
        .resolve_delegation(
            &t,
            DelegationOutcome::Failed {
                reason: "agent-b crashed".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(state, FsmState::Terminated);
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.state, FsmState::Terminated);

    workers.shutdown().await;
}

#[tokio::test]
async fn inbound_chain_through_self_is_a_cycle() {
    let runtime = runtime();
    let mut context = task("T-cycle", Echo::TYPE, json!({ "text": "x" }));
    context.metadata.insert(
        "delegation_chain".into(),
        json!(["agent-a", "agent-c"]),
    );
    context.caller_agent = Some(AgentId::new("agent-c").unwrap());

    let err = runtime.start(context).await.unwrap_err();
    assert!(matches!(err, A2wError::CycleDetected { .. }));
    assert!(runtime.status(&id("T-cycle")).await.is_err());
}

#[tokio::test]
async fn reset_reruns_and_retry_is_announced() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut events = runtime.subscribe(Channel::Events);
    let t = id("T-rerun");
    runtime
        .start(task("T-rerun", Echo::TYPE, json!({ "text": "again" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;

    runtime.reset(&t).await.unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.artifact, Some(Artifact::Text("again".into())));

    let mut retry = task("T-rerun-2", Echo::TYPE, json!({ "text": "again" }));
    retry.retry_of = Some(t.clone());
    runtime.start(retry).await.unwrap();
    let envelope = next_matching(&mut events, |e| {
        matches!(&e.message, Message::Event(AgentEvent::TaskRetried { .. }))
    })
    .await;
    let Message::Event(AgentEvent::TaskRetried { task_id, retry_of, .. }) = envelope.message else {
        unreachable!();
    };
    assert_eq!(task_id, id("T-rerun-2"));
    assert_eq!(retry_of, t);

    workers.shutdown().await;
}

#[tokio::test]
async fn removed_task_keeps_its_report() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-remove");
    runtime
        .start(task("T-remove", Echo::TYPE, json!({ "text": "bye" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;

    runtime.remove(&t).await.unwrap();
    assert!(runtime.status(&t).await.is_err());
    let report = runtime.report(&t).await.unwrap();
    assert_eq!(report.artifact, Some(Artifact::Text("bye".into())));

    workers.shutdown().await;
}

#[tokio::test]
async fn single_slot_resumes_after_insight() {
    let runtime = runtime_with(RuntimeConfig {
        max_concurrent: 1,
        ..config()
    });
    let workers = runtime.spawn_workers();
    let t = id("T-one-slot");
    runtime
        .start(task("T-one-slot", Research::TYPE, json!({ "topic": "grid storage" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Waiting).await;
    // give the idle dispatcher time to park on the empty queue
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ack = runtime
        .provide_insight(&t, insight(json!({ "market_trends": ["flow"] })), None)
        .await
        .unwrap();
    assert!(ack.resumed);
    wait_for_state(&runtime, &t, FsmState::Finished).await;

    // the slot is free again for the next task
    let next = id("T-one-slot-next");
    runtime
        .start(task("T-one-slot-next", Echo::TYPE, json!({ "text": "after" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &next, FsmState::Finished).await;

    workers.shutdown().await;
}

#[tokio::test]
async fn reused_id_does_not_serve_the_removed_report() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let t = id("T-reuse");
    runtime
        .start(task("T-reuse", Echo::TYPE, json!({ "text": "old" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Finished).await;
    runtime.remove(&t).await.unwrap();

    runtime
        .start(task("T-reuse", Research::TYPE, json!({ "topic": "new" })))
        .await
        .unwrap();
    wait_for_state(&runtime, &t, FsmState::Waiting).await;
    let err = runtime.report(&t).await.unwrap_err();
    assert!(matches!(err, A2wError::ReportPending(_)));

    workers.shutdown().await;
}

#[tokio::test]
async fn local_executor_error_terminates_as_internal() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut errors = runtime.subscribe(Channel::Errors);
    let t = id("T-self-handoff");
    runtime
        .start(task("T-self-handoff", Handoff::TYPE, json!({ "to": "agent-a" })))
        .await
        .unwrap();

    wait_for_state(&runtime, &t, FsmState::Terminated).await;
    let envelope = next_matching(&mut errors, |_| true).await;
    let Message::Error(payload) = envelope.message else {
        panic!("expected error");
    };
    assert_eq!(payload.code, ErrorCode::Internal);
    assert!(!payload.recoverable);
    assert_eq!(payload.task_id, Some(t.clone()));
    assert!(payload.message.contains("cycle"), "{}", payload.message);

    workers.shutdown().await;
}

#[tokio::test]
async fn viability_error_blocks_and_is_pushed() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut errors = runtime.subscribe(Channel::Errors);
    let t = id("T-upstream");
    runtime
        .start(task("T-upstream", Upstream::TYPE, json!({})))
        .await
        .unwrap();

    wait_for_state(&runtime, &t, FsmState::Blocked).await;
    let envelope = next_matching(&mut errors, |_| true).await;
    let Message::Error(payload) = envelope.message else {
        panic!("expected error");
    };
    assert_eq!(payload.code, ErrorCode::ExternalDependency);
    assert!(payload.recoverable);

    workers.shutdown().await;
}

#[tokio::test]
async fn finishing_update_reports_full_progress() {
    let runtime = runtime();
    let workers = runtime.spawn_workers();
    let mut status = runtime.subscribe(Channel::Status);
    runtime
        .start(task("T-progress", Echo::TYPE, json!({ "text": "done" })))
        .await
        .unwrap();

    let envelope = next_matching(&mut status, |e| {
        matches!(&e.message, Message::StatusUpdate(u) if u.state == FsmState::Finishing)
    })
    .await;
    let Message::StatusUpdate(update) = envelope.message else {
        unreachable!();
    };
    assert_eq!(update.progress, 1.0);

    workers.shutdown().await;
}
