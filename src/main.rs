use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stagehand::error::EngineError;
use stagehand::shutdown::listen_for_shutdown;
use stagehand::store::JobStore;
use stagehand::{EngineConfig, InMemoryJobStore, Job, LocalTransferClient, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(version)]
#[command(about = "A workflow transition engine for HPC job pipelines")]
struct Args {
    /// Number of concurrent workers
    #[arg(long, default_value = "3")]
    workers: usize,

    /// Restrict workers to jobs tagged with this workflow
    #[arg(long)]
    workflow: Option<String>,

    /// JSON file with an array of job records to load into the store
    #[arg(long)]
    jobs_file: Option<PathBuf>,

    /// Drop locks left behind by a previous run before starting
    #[arg(long)]
    clear_stale_locks: bool,
}

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let store = Arc::new(InMemoryJobStore::new());
    if let Some(path) = &args.jobs_file {
        let contents = std::fs::read_to_string(path).map_err(|source| EngineError::JobsFile {
            path: path.clone(),
            source,
        })?;
        let jobs: Vec<Job> = serde_json::from_str(&contents)?;
        tracing::info!(count = jobs.len(), file = %path.display(), "loading jobs");
        for job in jobs {
            store.insert(job);
        }
    }
    if args.clear_stale_locks {
        store.clear_stale_locks();
    }

    let mut config = EngineConfig::new(args.workers);
    if let Some(workflow) = args.workflow {
        config = config.with_workflow(workflow);
    }

    tracing::info!(
        workers = config.worker_count,
        workflow = ?config.workflow_filter,
        "starting stagehand"
    );

    let pool = WorkerPool::start(store.clone(), Arc::new(LocalTransferClient::new()), config);
    let token = pool.shutdown_token();
    listen_for_shutdown(token.clone());

    token.cancelled().await;
    pool.terminate().await;

    for job in store.all_jobs() {
        tracing::info!(job_id = %job.id, name = %job.name, state = %job.state, "final state");
    }
    Ok(())
}
