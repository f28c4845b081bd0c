//! `crm-automation` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a workflow JSON file without touching the database.
//! - `migrate`  — run pending database migrations.
//! - `import`   — create a workflow from a JSON file.
//! - `publish`  — publish (or unpublish) a workflow.
//! - `rollback` — restore an earlier version as the new draft.
//! - `emit`     — feed a CRM event JSON file to the engine.
//! - `cancel`   — cancel an execution.
//! - `worker`   — resume suspended executions when their delays expire.
//! - `stats`    — print execution statistics for a workflow.

mod graph_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{DbPool, PgResumeQueue, PgStore};
use engine::{
    spawn_resumption, Clock, EngineConfig, Event, ExecutionScheduler, ResumptionService,
    StatsAggregator, StatsWindow, Store, SystemClock, VersionStore,
};
use nodes::DryRunDispatcher;
use queue::ResumeQueue;

use crate::graph_file::GraphFile;

#[derive(Parser)]
#[command(
    name = "crm-automation",
    about = "Event-driven workflow automation for CRM data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Database {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "CRM_AUTOMATION_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

impl Database {
    async fn connect(&self) -> Result<DbPool> {
        db::create_pool(&self.database_url, self.max_connections)
            .await
            .context("failed to connect to database")
    }
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: Database,
    },
    /// Create a workflow from a JSON file and save its graph as version 2.
    Import {
        path: PathBuf,
        /// Overrides the `name` in the file.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "cli")]
        author: String,
        /// Publish right after saving.
        #[arg(long)]
        publish: bool,
        #[command(flatten)]
        database: Database,
    },
    /// Publish a workflow, or take it offline with `--unpublish`.
    Publish {
        workflow_id: Uuid,
        #[arg(long)]
        unpublish: bool,
        #[command(flatten)]
        database: Database,
    },
    /// Restore an earlier version as a new version.
    Rollback {
        workflow_id: Uuid,
        version: u32,
        #[arg(long, default_value = "cli")]
        author: String,
        #[command(flatten)]
        database: Database,
    },
    /// Emit one event (`{"type": ..., "payload": {...}}`) and run every
    /// matching workflow until it finishes or suspends.
    Emit {
        path: PathBuf,
        #[command(flatten)]
        database: Database,
    },
    /// Cancel an execution.
    Cancel {
        execution_id: Uuid,
        #[command(flatten)]
        database: Database,
    },
    /// Start a background worker that resumes delayed executions.
    Worker {
        #[arg(long, env = "CRM_AUTOMATION_POLL_INTERVAL_MS", default_value_t = 1000)]
        poll_interval_ms: u64,
        #[arg(long, env = "CRM_AUTOMATION_RESUME_BATCH", default_value_t = 100)]
        resume_batch: usize,
        #[command(flatten)]
        database: Database,
    },
    /// Print execution statistics for one workflow.
    Stats {
        #[arg(long)]
        workflow_id: Uuid,
        /// Look-back window; defaults to the engine's stats window.
        #[arg(long)]
        days: Option<i64>,
        #[command(flatten)]
        database: Database,
    },
}

/// Everything the engine needs, wired to Postgres.
struct Runtime {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<ExecutionScheduler>,
    versions: VersionStore,
}

impl Runtime {
    fn new(pool: DbPool) -> Self {
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
        let queue: Arc<dyn ResumeQueue> = Arc::new(PgResumeQueue::new(pool));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let scheduler = Arc::new(ExecutionScheduler::new(
            store.clone(),
            Arc::new(DryRunDispatcher),
            queue,
            clock.clone(),
        ));
        let versions = VersionStore::new(store.clone(), clock.clone());
        Self { store, clock, scheduler, versions }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Migrate { database } => {
            let pool = database.connect().await?;
            let known = db::run_migrations(&pool).await.context("migration failed")?;
            println!("Schema up to date ({known} migrations)");
            Ok(())
        }
        Command::Import { path, name, author, publish, database } => {
            let file = GraphFile::load(&path)?;
            let rt = Runtime::new(database.connect().await?);

            let name = name
                .or_else(|| file.name.clone())
                .unwrap_or_else(|| "untitled".to_string());
            let workflow = rt.versions.create(&name, file.folder_id, &author).await?;
            let version = rt
                .versions
                .save(workflow.id, file.nodes, file.edges, &author, Some("Imported".into()))
                .await?;
            println!("Created workflow {} at version {}", workflow.id, version.version);

            if publish {
                rt.versions.publish(workflow.id, true).await?;
                println!("Published workflow {}", workflow.id);
            }
            Ok(())
        }
        Command::Publish { workflow_id, unpublish, database } => {
            let rt = Runtime::new(database.connect().await?);
            let workflow = rt.versions.publish(workflow_id, !unpublish).await?;
            println!(
                "Workflow {} is now {}",
                workflow.id,
                if workflow.published { "published" } else { "unpublished" }
            );
            Ok(())
        }
        Command::Rollback { workflow_id, version, author, database } => {
            let rt = Runtime::new(database.connect().await?);
            let restored = rt.versions.rollback(workflow_id, version, &author).await?;
            println!(
                "Restored version {version} of workflow {workflow_id} as version {}",
                restored.version
            );
            Ok(())
        }
        Command::Emit { path, database } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let event: Event = serde_json::from_str(&content).context("invalid event JSON")?;

            let rt = Runtime::new(database.connect().await?);
            let started = rt.scheduler.handle_event(&event).await?;
            if started.is_empty() {
                println!("No published workflow matched '{}'", event.event_type);
            }
            for execution in started {
                println!(
                    "{}  workflow={}  v{}  {}",
                    execution.id, execution.workflow_id, execution.bound_version, execution.status
                );
            }
            Ok(())
        }
        Command::Cancel { execution_id, database } => {
            let rt = Runtime::new(database.connect().await?);
            let execution = rt.scheduler.cancel(execution_id).await?;
            println!("{}  {}", execution.id, execution.status);
            Ok(())
        }
        Command::Worker { poll_interval_ms, resume_batch, database } => {
            let config = EngineConfig {
                resume_poll_interval: Duration::from_millis(poll_interval_ms),
                resume_batch_size: resume_batch,
                ..EngineConfig::default()
            };
            let rt = Runtime::new(database.connect().await?);

            let service = ResumptionService::new(rt.scheduler.clone(), config);
            service.recover().await.context("failed to rebuild resume queue")?;

            info!("Starting resumption worker");
            let (handle, shutdown) = spawn_resumption(service);
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("Shutdown requested");
            // The receiver only disappears once the worker has stopped.
            let _ = shutdown.send(true);
            handle.await.context("resumption worker panicked")?;
            Ok(())
        }
        Command::Stats { workflow_id, days, database } => {
            let rt = Runtime::new(database.connect().await?);
            let days = days.unwrap_or(EngineConfig::default().stats_window_days);
            let window = StatsWindow::last_days(rt.clock.now(), days);
            let stats = StatsAggregator::new(rt.store.clone())
                .for_workflow(workflow_id, &window)
                .await?;

            println!("Workflow {workflow_id}, last {days} days");
            println!("  total:     {}", stats.total_runs);
            println!("  succeeded: {}", stats.successful_runs);
            println!("  failed:    {}", stats.failed_runs);
            println!("  success:   {:.1}%", stats.success_rate() * 100.0);
            println!("  avg ms:    {:.0}", stats.avg_duration_ms);
            match (stats.last_run_at, stats.last_run_status) {
                (Some(at), Some(status)) => println!("  last run:  {at} ({status})"),
                _ => println!("  last run:  never"),
            }
            Ok(())
        }
    }
}

fn validate(path: &Path) -> Result<()> {
    let file = GraphFile::load(path)?;
    let report = file.check();

    if report.is_clean() {
        println!(
            "✅ Workflow is valid: {} nodes, {} edges",
            file.nodes.len(),
            file.edges.len()
        );
        return Ok(());
    }

    for violation in &report.structure {
        eprintln!("❌ {violation}");
    }
    for violation in &report.integrity {
        eprintln!("⚠️  {violation} (blocks publish)");
    }
    std::process::exit(1);
}
