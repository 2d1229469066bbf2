//! `a2w` - runs one A2W agent over HTTP.

mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use a2w_core::domain::Weight;
use a2w_core::{RuntimeBuilder, RuntimeConfig, Task};

use crate::demo::{Echo, EchoExecutor, Research, ResearchExecutor};

#[derive(Debug, Parser)]
#[command(name = "a2w")]
#[command(about = "A2W agent runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "A2W_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `agent_id`
    #[arg(long)]
    agent_id: Option<String>,

    /// Overrides `weight` (0-100)
    #[arg(long)]
    weight: Option<i64>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = resolve_config(&cli)?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let runtime = RuntimeBuilder::new(config)
        .register::<Echo, _>(EchoExecutor)?
        .register::<Research, _>(ResearchExecutor)?
        .expect_task_types(&[Echo::TYPE, Research::TYPE])
        .build()?;
    let workers = runtime.spawn_workers();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(agent_id = %runtime.agent_id(), weight = %runtime.weight(), %addr, "A2W agent listening");

    axum::serve(listener, a2w_core::http::router(runtime))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    workers.shutdown().await;
    info!("A2W agent stopped");
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("a2w=info,a2w_core=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

/// File (or defaults), then command-line overrides, then validation.
fn resolve_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(agent_id) = &cli.agent_id {
        config.agent_id = agent_id.clone();
    }
    if let Some(weight) = cli.weight {
        config.weight = Weight::new(weight)?;
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
