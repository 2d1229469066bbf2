//! Executors the binary ships with, so a fresh agent has something to run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use a2w_core::domain::{A2wError, Artifact, Urgency};
use a2w_core::{ExecutionContext, Executor, Task};

/// Returns its input unchanged.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub text: String,
}

impl Task for Echo {
    const TYPE: &'static str = "demo.echo.v1";
    const DESCRIPTION: &'static str = "Echoes `text` back as a text artifact";
}

pub struct EchoExecutor;

#[async_trait]
impl Executor<Echo> for EchoExecutor {
    async fn execute(&self, task: Echo, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        ctx.report_progress(0.5, json!({ "chars": task.text.len() }))
            .await?;
        Ok(Artifact::Text(task.text))
    }
}

/// Asks the caller for each listed source, then summarizes what arrived.
#[derive(Debug, Serialize, Deserialize)]
pub struct Research {
    pub topic: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Task for Research {
    const TYPE: &'static str = "demo.research.v1";
    const DESCRIPTION: &'static str =
        "Raises a need for every source in `sources` and returns the collected insight";
}

pub struct ResearchExecutor;

#[async_trait]
impl Executor<Research> for ResearchExecutor {
    async fn execute(&self, task: Research, ctx: &ExecutionContext) -> Result<Artifact, A2wError> {
        ctx.report_progress(0.1, json!({ "topic": task.topic }))
            .await?;
        let insights = if task.sources.is_empty() {
            ctx.insights().await
        } else {
            ctx.need(
                task.sources.iter().cloned(),
                Urgency::Medium,
                format!("sources for {}", task.topic),
            )
            .await?
        };
        info!(task_id = %ctx.task_id(), received = insights.len(), "research inputs ready");
        ctx.report_progress(0.9, json!({ "received": insights.len() }))
            .await?;
        Ok(Artifact::Json(json!({
            "topic": task.topic,
            "findings": Value::Object(insights),
        })))
    }
}
