//! HTTP surface - REST and WebSocket endpoints under `/a2w/v1`.
//!
//! Handlers are thin: they extract, call [`AgentRuntime`], and wrap the
//! result in an envelope. Failures become [`ApiError`] error envelopes,
//! including malformed bodies and unknown routes.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::app::AgentRuntime;

pub use self::error::ApiError;
pub use self::extract::{A2wJson, A2wQuery};
pub use self::handlers::InsightRequest;

pub const API_PREFIX: &str = "/a2w/v1";

/// The full A2W router, state applied.
pub fn router(runtime: AgentRuntime) -> Router {
    let api = Router::new()
        .route("/manifest", get(handlers::manifest))
        .route("/capabilities", get(handlers::capabilities))
        .route("/start", post(handlers::start))
        .route("/status", get(handlers::status))
        .route("/stop", post(handlers::stop))
        .route("/terminate", post(handlers::terminate))
        .route("/report", get(handlers::report))
        .route("/logs", get(handlers::logs))
        .route("/insights", post(handlers::insights))
        .route("/weight", post(handlers::weight))
        .route("/ws/status", get(ws::status))
        .route("/ws/needs", get(ws::needs))
        .route("/ws/errors", get(ws::errors))
        .route("/ws/events", get(ws::events));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(handlers::not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(runtime)
}
