// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod queue;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::engine::EngineConfig;
use crate::job::{Job, JobSpec, JobState};
use crate::queue::{ChannelSink, QueueEvent};

pub use crate::engine::JobEngine;

/// How long `run_jobs` waits for an event before re-checking the queue.
const IDLE_CHECK: Duration = Duration::from_millis(500);

/// Final state of every job a `run` submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub jobs: Vec<Job>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.jobs.iter().all(|job| job.state == JobState::Done)
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|job| job.state == state).count()
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job-file loading and CLI overrides
/// - the engine (queue + worker)
/// - notification logging
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let cfg = load_config(&args)?;

    let mut engine_config = cfg.engine.to_engine_config();
    apply_overrides(&mut engine_config, &args)?;

    let mut jobs = cfg.jobs;
    jobs.extend(args.inputs.iter().map(JobSpec::for_input));
    if jobs.is_empty() {
        bail!("no jobs to run: pass input files or a job file with [[job]] entries");
    }

    if args.dry_run {
        print_dry_run(&engine_config, &jobs);
        return Ok(RunSummary::default());
    }

    let engine = JobEngine::new(engine_config).context("starting job engine")?;
    let summary = run_jobs(&engine, jobs).await;

    // Joining the worker blocks; keep it off the async runtime. The queue is
    // normally drained by now; if not, nothing is left running.
    tokio::task::spawn_blocking(move || engine.stop_now())
        .await
        .context("stopping job engine")?;

    summary
}

fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading job file {}", path.display())),
        None => {
            let default = default_config_path();
            if default.is_file() {
                info!(path = %default.display(), "using default job file");
                load_and_validate(&default)
                    .with_context(|| format!("loading job file {}", default.display()))
            } else {
                Ok(ConfigFile::try_from(config::RawConfigFile::default())?)
            }
        }
    }
}

fn apply_overrides(cfg: &mut EngineConfig, args: &CliArgs) -> Result<()> {
    if let Some(exe) = &args.executable {
        cfg.default_executable = Some(exe.clone());
    }
    if let Some(ms) = args.poll_interval_ms {
        if ms == 0 {
            bail!("--poll-interval-ms must be >= 1");
        }
        cfg.poll_interval = Duration::from_millis(ms);
    }
    if let Some(policy) = args.parallel_policy {
        cfg.parallel_policy = policy;
    }
    Ok(())
}

/// Submit `jobs`, log every queue change, and wait until the queue drains.
///
/// On Ctrl-C every job that has not finished is cancelled; the function
/// still waits for the running one to be terminated.
pub async fn run_jobs(engine: &JobEngine, jobs: Vec<JobSpec>) -> Result<RunSummary> {
    let (sink, mut rx) = ChannelSink::channel();
    engine.set_notifier(sink);

    let ids: Vec<_> = jobs.into_iter().map(|spec| engine.submit(spec).id).collect();
    info!(count = ids.len(), "jobs submitted");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while !engine.is_idle() {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => log_event(engine, &event),
                None => break,
            },
            res = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    continue;
                }
                warn!("Ctrl-C received; cancelling outstanding jobs");
                for job in engine.snapshot().iter().filter(|j| !j.is_terminal()) {
                    engine.cancel(job.id);
                }
            }
            _ = tokio::time::sleep(IDLE_CHECK) => {
                debug!(counts = ?engine.counts(), "waiting for queue to drain");
            }
        }
    }

    // Events still buffered describe transitions that already happened.
    while let Ok(event) = rx.try_recv() {
        log_event(engine, &event);
    }
    engine.clear_notifier();

    let summary = RunSummary {
        jobs: ids.iter().filter_map(|id| engine.get(*id)).collect(),
    };
    info!(
        done = summary.count(JobState::Done),
        error = summary.count(JobState::Error),
        cancelled = summary.count(JobState::Cancelled),
        "queue drained"
    );
    Ok(summary)
}

fn log_event(engine: &JobEngine, event: &QueueEvent) {
    let job = event.job_id().and_then(|id| engine.get(id));
    let input = job
        .as_ref()
        .map(|j| j.input_path.display().to_string())
        .unwrap_or_default();

    match event {
        QueueEvent::Finished { id, state } => {
            let job = job.as_ref();
            match state {
                JobState::Done => info!(job_id = %id, %input, exit_code = ?job.and_then(|j| j.exit_code), "job done"),
                JobState::Error => warn!(
                    job_id = %id,
                    %input,
                    error = job.and_then(|j| j.error_message.as_deref()).unwrap_or(""),
                    "job failed"
                ),
                _ => info!(job_id = %id, %input, state = %state, "job finished"),
            }
        }
        other => debug!(event = ?other, %input, "queue event"),
    }
}

/// Print the resolved engine settings and job list.
fn print_dry_run(cfg: &EngineConfig, jobs: &[JobSpec]) {
    println!("orcaq dry-run");
    match &cfg.default_executable {
        Some(exe) => println!("  engine.executable = {}", exe.display()),
        None => println!("  engine.executable = (none)"),
    }
    println!("  engine.poll_interval_ms = {}", cfg.poll_interval.as_millis());
    println!("  engine.parallel_policy = {:?}", cfg.parallel_policy);
    println!();

    println!("jobs ({}):", jobs.len());
    for (idx, job) in jobs.iter().enumerate() {
        println!("  {}. {}", idx + 1, job.input_path.display());
        println!("      output: {}", job.output_path.display());
        if let Some(exe) = &job.executable_path {
            println!("      executable: {}", exe.display());
        }
    }

    debug!("dry-run complete (no execution)");
}
