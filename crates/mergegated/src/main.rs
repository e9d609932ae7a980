//! Mergegate daemon.
//!
//! Watches a spool directory for change-event payloads, drives each through
//! the workflow engine, ticks the SLA monitor, and retries deferred ticket
//! enrichment. Event delivery is file-based on purpose: the code host's
//! webhook receiver (or any other transport) only has to drop JSON payloads
//! into the spool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn, Level};

use mergegate_core::{ChangeEvent, StepName};
use mergegate_engine::{EngineConfig, WorkflowEngine};
use mergegate_gateway::{
    CheckerClient, Gateway, GatewayConfig, HttpCheckerClient, HttpCodeHostClient,
    HttpTicketClient,
};
use mergegate_state::SurrealStore;
use mergegate_tickets::{IdentityResolver, TicketFiler};

#[derive(Parser)]
#[command(name = "mergegated")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mergegate review orchestration daemon", long_about = None)]
struct Args {
    /// Path to the engine configuration file (JSON)
    #[arg(long, env = "MERGEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory watched for change-event payload files
    #[arg(long, env = "MERGEGATE_SPOOL", default_value = ".mergegate/spool")]
    spool: PathBuf,

    /// Seconds between SLA evaluation ticks
    #[arg(long, default_value = "30")]
    sla_tick_secs: u64,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

struct Daemon {
    engine: Arc<WorkflowEngine>,
    filer: Arc<TicketFiler>,
}

async fn build_daemon(config: EngineConfig) -> Result<Daemon> {
    let store = Arc::new(
        SurrealStore::from_env()
            .await
            .context("Failed to connect to Mergegate database")?,
    );

    let gateway = Arc::new(Gateway::new(GatewayConfig {
        retry: config.retry.clone(),
        breaker: config.breaker.clone(),
        attempt_timeout_ms: config.attempt_timeout_ms,
    }));

    let checker_token = std::env::var("MERGEGATE_CHECKER_TOKEN").ok();
    let mut checkers: HashMap<StepName, Arc<dyn CheckerClient>> = HashMap::new();
    for checker in config.checkers.iter().filter(|c| c.enabled) {
        let client = HttpCheckerClient::new(
            format!("checker:{}", checker.step),
            checker.endpoint.clone(),
            checker_token.as_deref(),
        )
        .map_err(|e| anyhow::anyhow!("checker client for {}: {}", checker.step, e))?;
        checkers.insert(checker.step, Arc::new(client));
    }

    let code_host_url = std::env::var("MERGEGATE_CODE_HOST_URL")
        .unwrap_or_else(|_| "http://localhost:8480".to_string());
    let code_host = Arc::new(
        HttpCodeHostClient::new(
            code_host_url,
            std::env::var("MERGEGATE_CODE_HOST_TOKEN").ok().as_deref(),
        )
        .map_err(|e| anyhow::anyhow!("code host client: {e}"))?,
    );

    let ticketing_url = std::env::var("MERGEGATE_TICKETING_URL")
        .unwrap_or_else(|_| "http://localhost:8470".to_string());
    let ticket_client = Arc::new(
        HttpTicketClient::new(
            ticketing_url,
            std::env::var("MERGEGATE_TICKETING_TOKEN").ok().as_deref(),
        )
        .map_err(|e| anyhow::anyhow!("ticketing client: {e}"))?,
    );

    let resolver = IdentityResolver::new(
        store.clone(),
        ticket_client.clone(),
        gateway.clone(),
        config.resolver.clone(),
    );
    let filer = Arc::new(TicketFiler::new(
        store.clone(),
        ticket_client,
        gateway.clone(),
        resolver,
        config.tickets.clone(),
    ));

    let engine = Arc::new(WorkflowEngine::new(
        config,
        store,
        checkers,
        code_host,
        gateway,
        filer.clone(),
    ));

    Ok(Daemon { engine, filer })
}

/// Read and remove every event payload currently in the spool, oldest first.
fn drain_spool(spool: &Path) -> Vec<ChangeEvent> {
    let entries = match std::fs::read_dir(spool) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(spool = %spool.display(), error = %err, "spool directory unreadable");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut events = Vec::new();
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ChangeEvent>(&raw) {
                Ok(event) => {
                    events.push(event);
                    if let Err(err) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %err, "failed to remove consumed event");
                    }
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "malformed event payload; leaving in spool");
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read event payload");
            }
        }
    }
    events
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    mergegate_core::init_tracing(args.json, Level::INFO);

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    std::fs::create_dir_all(&args.spool)
        .with_context(|| format!("Failed to create spool directory {}", args.spool.display()))?;

    let daemon = build_daemon(config).await?;
    info!(spool = %args.spool.display(), "mergegated started");

    // Resume instances left mid-flight by a previous process.
    let to_run = daemon.engine.resume(Utc::now()).await?;
    for id in to_run {
        let engine = daemon.engine.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.run(&id).await {
                error!(workflow_id = %id, error = %err, "resumed instance failed");
            }
        });
    }

    run_loop(args, daemon).await
}

async fn run_loop(args: Args, daemon: Daemon) -> Result<()> {
    let mut sla_tick = tokio::time::interval(std::time::Duration::from_secs(args.sla_tick_secs));
    let mut spool_tick = tokio::time::interval(std::time::Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = spool_tick.tick() => {
                for event in drain_spool(&args.spool) {
                    let engine = daemon.engine.clone();
                    match engine.handle_event(event).await {
                        Ok(id) => {
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                if let Err(err) = engine.run(&id).await {
                                    error!(workflow_id = %id, error = %err, "workflow run failed");
                                }
                            });
                        }
                        Err(err) => error!(error = %err, "failed to accept change event"),
                    }
                }
            }
            _ = sla_tick.tick() => {
                if let Err(err) = daemon.engine.poll_sla(Utc::now()).await {
                    error!(error = %err, "SLA evaluation failed");
                }
                daemon.filer.flush_deferred().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
