use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceExt;

use a2w_core::domain::{A2wError, Artifact};
use a2w_core::http::router;
use a2w_core::{AgentRuntime, ExecutionContext, Executor, RuntimeBuilder, RuntimeConfig, Task};

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

fn runtime(config: RuntimeConfig) -> AgentRuntime {
    RuntimeBuilder::new(config)
        .register::<Echo, _>(EchoExecutor)
        .unwrap()
        .build()
        .unwrap()
}

fn app() -> Router {
    router(runtime(RuntimeConfig {
        agent_id: "agent-http".into(),
        ..Default::default()
    }))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn echo_task(task_id: &str) -> Value {
    json!({
        "task_id": task_id,
        "task_type": Echo::TYPE,
        "payload": { "text": "hi" },
    })
}

#[tokio::test]
async fn manifest_is_an_envelope_signed_by_the_agent() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/a2w/v1/manifest", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["a2w_version"], "1.0");
    assert_eq!(body["agent_id"], "agent-http");
    assert_eq!(body["message_type"], "payload");
    assert_eq!(body["payload"]["agent_id"], "agent-http");
    assert_eq!(body["payload"]["weight"], 50);
    assert_eq!(body["payload"]["task_types"], json!([Echo::TYPE]));
}

#[tokio::test]
async fn capabilities_list_registered_task_types() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/a2w/v1/capabilities", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["abilities"][0]["name"], Echo::TYPE);
}

#[tokio::test]
async fn start_is_idempotent_on_task_id() {
    let app = app();
    let (first, body) = call(&app, Method::POST, "/a2w/v1/start", Some(echo_task("T1"))).await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(body["payload"]["outcome"], "accepted");

    let mut changed = echo_task("T1");
    changed["payload"]["text"] = json!("something else");
    let (second, body) = call(&app, Method::POST, "/a2w/v1/start", Some(changed)).await;
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["payload"]["outcome"], "existing");
    assert_eq!(body["payload"]["handle"]["task_id"], "T1");

    let (_, status) = call(&app, Method::GET, "/a2w/v1/status?task_id=T1", None).await;
    assert_eq!(status["payload"]["state"], "idle");
}

#[tokio::test]
async fn start_accepts_an_enveloped_body() {
    let app = app();
    let body = json!({
        "a2w_version": "1.0",
        "agent_id": "caller",
        "message_type": "payload",
        "payload": echo_task("T-env"),
    });
    let (status, _) = call(&app, Method::POST, "/a2w/v1/start", Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn malformed_body_gets_an_error_envelope() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/start",
        Some(json!({ "task_type": Echo::TYPE })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message_type"], "error");
    assert_eq!(body["agent_id"], "agent-http");
    assert_eq!(body["payload"]["code"], "E010_INVALID_INPUT");
    assert_eq!(body["payload"]["recoverable"], true);
}

#[tokio::test]
async fn unknown_task_type_is_refused() {
    let app = app();
    let body = json!({ "task_id": "T2", "task_type": "test.nothing.v1" });
    let (status, body) = call(&app, Method::POST, "/a2w/v1/start", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["payload"]["code"], "E010_INVALID_INPUT");

    let (status, _) = call(&app, Method::GET, "/a2w/v1/status?task_id=T2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn newer_protocol_major_is_refused() {
    let app = app();
    let body = json!({
        "a2w_version": "2.0",
        "agent_id": "caller",
        "message_type": "payload",
        "payload": echo_task("T3"),
    });
    let (status, body) = call(&app, Method::POST, "/a2w/v1/start", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["payload"]["code"], "E010_INVALID_INPUT");
    assert_eq!(body["payload"]["details"]["supported_major"], 1);
}

#[tokio::test]
async fn status_of_unknown_task_is_not_found() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/a2w/v1/status?task_id=nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["payload"]["task_id"], "nope");
}

#[tokio::test]
async fn status_without_task_id_is_invalid_input() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/a2w/v1/status", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["payload"]["code"], "E010_INVALID_INPUT");
}

#[tokio::test]
async fn report_before_the_end_is_pending() {
    let app = app();
    call(&app, Method::POST, "/a2w/v1/start", Some(echo_task("T4"))).await;
    let (status, _) = call(&app, Method::GET, "/a2w/v1/report?task_id=T4", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn stop_of_idle_task_is_immediate() {
    let app = app();
    call(&app, Method::POST, "/a2w/v1/start", Some(echo_task("T5"))).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/stop",
        Some(json!({ "task_id": "T5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["state"], "stopped");
    assert_eq!(body["payload"]["pending"], false);

    let (status, body) = call(&app, Method::GET, "/a2w/v1/report?task_id=T5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["state"], "stopped");
}

#[tokio::test]
async fn low_weight_requester_cannot_terminate() {
    let app = app();
    let mut task = echo_task("T6");
    task["weight_caller"] = json!(90);
    call(&app, Method::POST, "/a2w/v1/start", Some(task)).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/terminate",
        Some(json!({ "task_id": "T6", "requester_weight": 40 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["payload"]["code"], "E030_LOW_WEIGHT");

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/terminate",
        Some(json!({ "task_id": "T6", "requester_weight": 40, "override": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["to"], "terminated");
}

#[tokio::test]
async fn insight_for_a_task_that_is_not_waiting_conflicts() {
    let app = app();
    call(&app, Method::POST, "/a2w/v1/start", Some(echo_task("T7"))).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/insights",
        Some(json!({ "task_id": "T7", "payload": { "k": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["payload"]["details"]["state"], "idle");
}

#[tokio::test]
async fn logs_page_through_emitted_envelopes() {
    let runtime = runtime(RuntimeConfig::default());
    let workers = runtime.spawn_workers();
    let app = router(runtime.clone());

    let mut rx = runtime.broadcaster().subscribe(a2w_core::app::Channel::Status);
    call(&app, Method::POST, "/a2w/v1/start", Some(echo_task("T8"))).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while let Ok(envelope) = rx.recv().await {
            if let a2w_core::domain::Message::StatusUpdate(update) = envelope.message
                && update.state.is_terminal()
            {
                break;
            }
        }
    })
    .await;
    // the log sink runs on its own task
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (status, body) = call(&app, Method::GET, "/a2w/v1/logs?cursor=0&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["payload"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let next = body["payload"]["next_cursor"].as_u64().unwrap();
    assert_eq!(next, entries[1]["seq"].as_u64().unwrap());

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/a2w/v1/logs?cursor={next}&limit=100"),
        None,
    )
    .await;
    let rest = body["payload"]["entries"].as_array().unwrap();
    assert!(!rest.is_empty());
    assert!(rest.iter().all(|e| e["seq"].as_u64().unwrap() > next));

    let (status, _) = call(&app, Method::GET, "/a2w/v1/logs?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    workers.shutdown().await;
}

#[tokio::test]
async fn weight_update_requires_the_configured_token() {
    let app = router(runtime(RuntimeConfig {
        weight_update_token: Some("s3cret".into()),
        ..Default::default()
    }));

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/weight",
        Some(json!({ "weight": 80 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["payload"]["code"], "E020_PERMISSION_DENIED");

    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/weight",
        Some(json!({ "weight": 80, "token": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["previous"], 50);
    assert_eq!(body["payload"]["weight"], 80);

    let (_, manifest) = call(&app, Method::GET, "/a2w/v1/manifest", None).await;
    assert_eq!(manifest["payload"]["weight"], 80);
}

#[tokio::test]
async fn out_of_range_weight_is_invalid_input() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/a2w/v1/weight",
        Some(json!({ "weight": 101 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["payload"]["code"], "E010_INVALID_INPUT");
}

#[tokio::test]
async fn unknown_route_gets_an_error_envelope() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/a2w/v1/nothing-here", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message_type"], "error");
    assert_eq!(body["payload"]["details"]["path"], "/a2w/v1/nothing-here");
}
