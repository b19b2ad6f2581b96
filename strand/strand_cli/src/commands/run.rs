//! Run commands
//!
//! `strand run` boots a runtime, starts the fan-out application and spreads
//! tasks over its workers round-robin.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;
use strand_concurrency::deferred::{multi_async, Deferred, Failure};
use strand_core::Value;
use strand_runtime::apps::fanout;
use strand_runtime::system::config::ApplicationConfig;
use strand_runtime::{logging, Runtime, RuntimeConfig};
use tracing::{info, warn};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Number of fan-out workers
    #[clap(long)]
    pub workers: Option<usize>,

    /// Number of tasks to fan out
    #[clap(long, default_value_t = 8)]
    pub tasks: usize,

    /// Per-task reply timeout in milliseconds
    #[clap(long)]
    pub timeout_ms: Option<u64>,
}

/// What happened to the tasks of one run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks that produced a result
    pub succeeded: usize,

    /// Tasks that failed or timed out
    pub failed: usize,
}

/// Implementation of the run command
pub fn execute_run(args: &RunArgs) -> Result<RunSummary> {
    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, args)?;
    logging::init(config.log_level);

    let runtime = Runtime::new(config)?;
    runtime.start()?;

    let outcome = fan_out(&runtime, args.tasks);
    if let Err(e) = runtime.shutdown() {
        warn!("Shutdown did not complete: {:#}", e);
    }
    outcome
}

fn apply_overrides(config: &mut RuntimeConfig, args: &RunArgs) -> Result<()> {
    if let Some(workers) = args.workers {
        if workers == 0 {
            bail!("--workers must be at least 1");
        }
        config
            .applications
            .entry(fanout::NAME.to_string())
            .or_insert_with(ApplicationConfig::default)
            .workers = Some(workers);
    }

    if let Some(timeout_ms) = args.timeout_ms {
        if timeout_ms == 0 {
            bail!("--timeout-ms must be positive");
        }
        config.send_timeout_ms = Some(timeout_ms);
    }

    Ok(())
}

fn fan_out(runtime: &Runtime, tasks: usize) -> Result<RunSummary> {
    let handle = runtime.run_application(fanout::NAME)?;
    let workers: Vec<String> = handle["workers"]
        .as_array()
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if workers.is_empty() {
        bail!("Application {} started without workers", fanout::NAME);
    }
    info!(tasks, workers = workers.len(), "Fanning out tasks");

    let mut assigned = Vec::with_capacity(tasks);
    let mut replies: Vec<Deferred> = Vec::with_capacity(tasks);
    for task in 0..tasks {
        let worker = &workers[task % workers.len()];
        let reply = runtime
            .send(worker, "run_task", vec![json!(task + 1)])
            .with_context(|| format!("Failed to send task {} to {}", task, worker))?;
        assigned.push(worker.clone());
        replies.push(reply);
    }

    let outcomes = multi_async(replies)
        .wait(runtime.config().shutdown_timeout())
        .map_err(Failure::into_error)
        .context("Tasks did not complete")?;

    let mut summary = RunSummary::default();
    for (task, (worker, outcome)) in assigned.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(result) => {
                summary.succeeded += 1;
                println!("task {} on {}: sum={}", task, worker, result["sum"]);
            }
            Err(failure) => {
                summary.failed += 1;
                println!("task {} on {}: failed: {}", task, worker, failure.observed());
            }
        }
    }

    println!(
        "{} tasks: {} succeeded, {} failed",
        tasks, summary.succeeded, summary.failed
    );
    Ok(summary)
}
