//! Mergegate - merge-gating review orchestration CLI
//!
//! The `mergegate` command drives and inspects review workflows.
//!
//! ## Commands
//!
//! - `run`: Feed a change-event payload through the pipeline
//! - `show`: Inspect a persisted workflow instance
//! - `list`: List workflow instances
//! - `review`: Submit an approval or rejection vote
//! - `resolve`: Debug an identity resolution
//! - `tickets`: List filed tickets
//! - `breakers`: Show circuit breaker states

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use mergegate_core::{
    AuthorIdentity, ChangeEvent, ReviewDecision, StepName, WorkflowId, WorkflowInstance,
};
use mergegate_engine::{EngineConfig, WorkflowEngine};
use mergegate_gateway::{
    CheckerClient, Gateway, GatewayConfig, HttpCheckerClient, HttpCodeHostClient,
    HttpTicketClient,
};
use mergegate_state::storage_traits::{InstanceStore, TicketStore};
use mergegate_state::SurrealStore;
use mergegate_tickets::{IdentityResolver, TicketFiler};

#[derive(Parser)]
#[command(name = "mergegate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Merge-gating review orchestration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the engine configuration file (JSON)
    #[arg(long, global = true, env = "MERGEGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Summary,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteArg {
    Approve,
    Reject,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a change event payload (JSON file)
    Run {
        /// Path to the change-event payload
        #[arg(short, long)]
        event: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        output: OutputFormat,
    },

    /// Show a persisted workflow instance
    Show {
        /// Workflow instance id
        workflow_id: String,

        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        output: OutputFormat,
    },

    /// List workflow instances
    List {
        /// Filter by repository
        #[arg(short, long)]
        repository: Option<String>,
    },

    /// Submit a review vote for a suspended instance
    Review {
        /// Workflow instance id
        workflow_id: String,

        /// Reviewer identifier
        #[arg(short = 'r', long)]
        reviewer: String,

        /// The vote
        #[arg(long, value_enum)]
        decision: VoteArg,

        /// Optional review comment
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Resolve an author identity to a ticketing account
    Resolve {
        /// Primary contact identifier (email)
        #[arg(long)]
        contact: String,

        /// Code-host username
        #[arg(long)]
        username: String,

        /// Changed paths consulted for component ownership
        #[arg(long)]
        paths: Vec<String>,
    },

    /// List filed tickets
    Tickets,

    /// Show circuit breaker states
    Breakers,
}

struct App {
    store: Arc<SurrealStore>,
    engine: WorkflowEngine,
    gateway: Arc<Gateway>,
    resolver: IdentityResolver,
}

async fn build_app(config: EngineConfig) -> Result<App> {
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
    let code_host_token = std::env::var("MERGEGATE_CODE_HOST_TOKEN").ok();
    let code_host = Arc::new(
        HttpCodeHostClient::new(code_host_url, code_host_token.as_deref())
            .map_err(|e| anyhow::anyhow!("code host client: {e}"))?,
    );

    let ticketing_url = std::env::var("MERGEGATE_TICKETING_URL")
        .unwrap_or_else(|_| "http://localhost:8470".to_string());
    let ticketing_token = std::env::var("MERGEGATE_TICKETING_TOKEN").ok();
    let ticket_client = Arc::new(
        HttpTicketClient::new(ticketing_url, ticketing_token.as_deref())
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
        ticket_client.clone(),
        gateway.clone(),
        IdentityResolver::new(
            store.clone(),
            ticket_client,
            gateway.clone(),
            config.resolver.clone(),
        ),
        config.tickets.clone(),
    ));

    let engine = WorkflowEngine::new(
        config,
        store.clone(),
        checkers,
        code_host,
        gateway.clone(),
        filer,
    );

    Ok(App {
        store,
        engine,
        gateway,
        resolver,
    })
}

fn print_instance(instance: &WorkflowInstance, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(instance)?);
        }
        OutputFormat::Summary => {
            println!("workflow:  {}", instance.id);
            println!("change:    {}", instance.change_ref);
            println!("status:    {:?}", instance.status);
            println!("path:      {:?}", instance.path);
            if let Some(result) = instance.result {
                println!("result:    {}", result);
            }
            for step in &instance.steps {
                println!(
                    "  {:<24} {:?} ({} finding(s), {}ms)",
                    step.step.to_string(),
                    step.status,
                    step.findings.len(),
                    step.duration_ms
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mergegate_core::init_tracing(cli.json, level);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let app = build_app(config).await?;

    match cli.command {
        Commands::Run { event, output } => {
            let raw = std::fs::read_to_string(&event)
                .with_context(|| format!("Failed to read event payload {}", event.display()))?;
            let event: ChangeEvent =
                serde_json::from_str(&raw).context("Malformed change-event payload")?;

            let id = app.engine.handle_event(event).await?;
            let instance = app.engine.run(&id).await?;
            print_instance(&instance, output)?;

            // Nonzero exit when the pipeline did not approve.
            match instance.status {
                mergegate_core::WorkflowStatus::Blocked
                | mergegate_core::WorkflowStatus::Failed => std::process::exit(1),
                _ => {}
            }
        }

        Commands::Show {
            workflow_id,
            output,
        } => {
            let instance = app
                .store
                .get_instance(&WorkflowId(workflow_id))
                .await
                .context("Workflow instance not found")?;
            print_instance(&instance, output)?;
        }

        Commands::List { repository } => {
            let instances = app.store.list_instances(repository.as_deref()).await?;
            for instance in instances {
                println!(
                    "{}  {:<16} {:?}",
                    instance.id, instance.change_ref.change_id, instance.status
                );
            }
        }

        Commands::Review {
            workflow_id,
            reviewer,
            decision,
            comment,
        } => {
            // Re-open gates for suspended instances persisted by a prior
            // process before applying the vote.
            app.engine.resume(Utc::now()).await?;

            let decision = match decision {
                VoteArg::Approve => ReviewDecision::Approve,
                VoteArg::Reject => ReviewDecision::Reject,
            };
            let id = WorkflowId(workflow_id);
            let resolution = app
                .engine
                .submit_review(&id, &reviewer, decision, comment, Utc::now())
                .await?;
            match resolution {
                Some(status) => println!("review resolved: {:?}", status),
                None => println!("vote recorded; gate still open"),
            }
        }

        Commands::Resolve {
            contact,
            username,
            paths,
        } => {
            let author = AuthorIdentity::new(contact, username);
            let outcome = app.resolver.resolve(&author, &paths, Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Tickets => {
            let tickets = app.store.list_tickets().await?;
            for ticket in tickets {
                println!(
                    "{:<12} {}  assignee={}",
                    ticket.external_key,
                    ticket.change_ref,
                    ticket.assignee_account.as_deref().unwrap_or("<unassigned>")
                );
            }
        }

        Commands::Breakers => {
            for snapshot in app.gateway.breaker_snapshots() {
                println!(
                    "{:<20} {:?} failures={}",
                    snapshot.dependency_name, snapshot.state, snapshot.consecutive_failures
                );
            }
        }
    }

    Ok(())
}
