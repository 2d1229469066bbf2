//! Executor trait - the pluggable logic that actually performs a task.
//!
//! Two layers, as with any typed registry:
//! - `Executor<T>`: typed, what applications implement
//! - `DynExecutor`: object-safe, what the runtime stores
//!
//! `TypedExecutor<T, E>` erases one into the other.

use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;

use super::task::Task;
use crate::app::context::ExecutionContext;
use crate::domain::{A2wError, Artifact};

/// Executor runs one task to completion.
///
/// Returning `Ok` finishes the task with the artifact. Returning
/// `Err(A2wError::MissingData { .. })` suspends it awaiting the listed keys;
/// other errors are routed by the error reporter.
///
/// # Example
/// ```ignore
/// struct MarketScanner;
///
/// #[async_trait]
/// impl Executor<MarketScan> for MarketScanner {
///     async fn execute(&self, task: MarketScan, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
///         let data = ctx.need(["market_trends"], Urgency::High, "trend feed").await?;
///         ctx.report_progress(0.5, json!({ "region": task.region })).await?;
///         Ok(Artifact::Json(data.into()))
///     }
/// }
/// ```
#[async_trait]
pub trait Executor<T: Task>: Send + Sync {
    async fn execute(&self, task: T, ctx: &ExecutionContext) -> Result<Artifact, A2wError>;
}

/// Object-safe executor, stored as `Arc<dyn DynExecutor>`.
#[async_trait]
pub trait DynExecutor: Send + Sync {
    async fn execute_dyn(&self, payload: Value, ctx: &ExecutionContext) -> Result<Artifact, A2wError>;

    /// Rejects payloads the executor could never decode, before registration.
    fn check_payload(&self, payload: &Value) -> Result<(), A2wError>;

    fn task_type(&self) -> &str;

    fn description(&self) -> &str;
}

pub struct TypedExecutor<T: Task, E: Executor<T>> {
    executor: E,
    _marker: PhantomData<T>,
}

impl<T: Task, E: Executor<T>> TypedExecutor<T, E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            _marker: PhantomData,
        }
    }

    fn decode(payload: Value) -> Result<T, A2wError> {
        serde_json::from_value(payload)
            .map_err(|e| A2wError::InvalidInput(format!("payload for {}: {e}", T::TYPE)))
    }
}

#[async_trait]
impl<T: Task, E: Executor<T>> DynExecutor for TypedExecutor<T, E> {
    async fn execute_dyn(&self, payload: Value, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        let task = Self::decode(payload)?;
        self.executor.execute(task, ctx).await
    }

    fn check_payload(&self, payload: &Value) -> Result<(), A2wError> {
        Self::decode(payload.clone()).map(|_| ())
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }
}
