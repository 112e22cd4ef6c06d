// src/lib.rs

//! A cancellable, capacity-bounded task executor.
//!
//! [`DefaultExecutor`] runs async bodies immediately, after a delay, with a
//! fixed delay between runs, or at a fixed rate. A single event loop owns all
//! scheduling state; callers interact through the [`Executor`] trait and the
//! futures it hands back. The `schedex` binary drives it from a TOML job
//! file.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod executor;
pub mod logging;
pub mod task;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

pub use engine::{Element, Handle, PriorityQueue};
pub use errors::{SchedexError, TASK_PANIC, TaskError};
pub use executor::{DefaultExecutor, Executor};
pub use task::{BoxFuture, ProducerFuture, ScheduledFuture, TaskFuture, TaskId};
pub use tokio_util::sync::CancellationToken;
pub use types::{ExecutorStatus, TaskKind, TaskStatus};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, JobConfig};
use crate::exec::command_body;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job file loading
/// - the executor and one task per job
/// - Ctrl-C handling with a bounded graceful shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading job file {}", args.config.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let root = CancellationToken::new();
    let exec = DefaultExecutor::from_config(&root, &cfg.executor);

    let mut futures = Vec::with_capacity(cfg.job.len());
    for (name, job) in cfg.job.iter() {
        let future = schedule_job(&exec, name, job)
            .with_context(|| format!("scheduling job '{name}'"))?;
        futures.push((name.clone(), future));
    }

    // Nothing repeats: let the one-shot jobs drain, then exit.
    if !cfg.has_periodic_jobs() {
        info!("no periodic jobs; exiting once all jobs have run");
        exec.cancel().await;
    }

    tokio::select! {
        _ = exec.terminated() => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
            }
            shutdown(&exec, &root, cfg.executor.shutdown_timeout).await;
        }
    }

    report(&futures)
}

fn schedule_job(
    exec: &DefaultExecutor,
    name: &str,
    job: &JobConfig,
) -> errors::Result<Arc<dyn ScheduledFuture>> {
    let body = command_body(name, job.cmd.as_str());
    let future = match job.kind {
        TaskKind::Once => exec.schedule(body, job.initial_delay)?,
        TaskKind::FixedDelay => {
            exec.schedule_with_fixed_delay(body, job.initial_delay, job.period)?
        }
        TaskKind::FixedRate => {
            exec.schedule_with_fixed_rate(body, job.initial_delay, job.period)?
        }
    };
    debug!(job = %name, task = %future.id(), kind = %job.kind, "job scheduled");
    Ok(future)
}

/// Graceful first; after `grace`, drop queued work and cancel running jobs.
async fn shutdown(exec: &DefaultExecutor, root: &CancellationToken, grace: Duration) {
    info!(?grace, "Ctrl-C received; shutting down");
    exec.cancel().await;
    if exec.await_termination(grace).await {
        return;
    }

    warn!(?grace, "jobs still running after shutdown timeout; forcing");
    for future in exec.cancel_now().await {
        future.cancel();
    }
    root.cancel();
    exec.terminated().await;
}

/// Log how each job ended. Any real failure makes the run fail.
fn report(futures: &[(String, Arc<dyn ScheduledFuture>)]) -> Result<()> {
    let mut failed = 0usize;
    for (name, future) in futures {
        match future.err() {
            None => info!(job = %name, "job completed"),
            Some(err) if err.is_canceled() => info!(job = %name, "job cancelled"),
            Some(err) => {
                failed += 1;
                warn!(job = %name, error = %err, "job failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} job(s) failed");
    }
    Ok(())
}

/// Simple dry-run output: print the executor limits and every job.
fn print_dry_run(cfg: &ConfigFile) {
    let limit = |n: i64| {
        if n < 0 {
            "unbounded".to_string()
        } else {
            n.to_string()
        }
    };

    println!("schedex dry-run");
    println!("  executor.concurrency = {}", limit(cfg.executor.concurrency));
    println!("  executor.queue_capacity = {}", limit(cfg.executor.queue_capacity));
    println!("  executor.shutdown_timeout = {:?}", cfg.executor.shutdown_timeout);
    println!();

    println!("jobs ({}):", cfg.job.len());
    for (name, job) in cfg.job.iter() {
        println!("  - {name}");
        println!("      cmd: {}", job.cmd);
        println!("      kind: {}", job.kind);
        if !job.initial_delay.is_zero() {
            println!("      initial_delay: {:?}", job.initial_delay);
        }
        if job.kind.is_periodic() {
            println!("      period: {:?}", job.period);
        }
    }

    debug!("dry-run complete (no execution)");
}
