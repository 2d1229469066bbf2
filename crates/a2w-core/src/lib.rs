//! a2w-core
//!
//! Core of an A2W (agent-to-work) agent runtime: the task FSM, the envelope
//! codec and the HTTP/WebSocket surface other agents talk to.
//!
//! # Modules
//! - **domain**: ids, task context, FSM states, envelopes, errors, events
//! - **ports**: seams to the outside (Clock, IdGenerator, ReportStore, AbilityRegistry, DelegationTransport)
//! - **impls**: default implementations of the ports
//! - **exec**: the typed `Task` / `Executor` API and its registry
//! - **app**: runtime components and the [`AgentRuntime`] facade
//! - **config**: [`RuntimeConfig`], loaded by the binary from TOML
//! - **http**: axum router for `/a2w/v1`

pub mod app;
pub mod config;
pub mod domain;
pub mod exec;
pub mod http;
pub mod impls;
pub mod ports;

pub use app::{AgentRuntime, BuildError, ExecutionContext, RuntimeBuilder, RuntimeWorkers};
pub use config::RuntimeConfig;
pub use domain::{A2wError, Artifact, Envelope, FsmState, TaskContext, TaskId};
pub use exec::{Executor, Task};
