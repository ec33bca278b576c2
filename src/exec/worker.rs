// src/exec/worker.rs

//! The single worker loop that runs queued jobs one at a time.
//!
//! Per job:
//! 1. take the head of the pending partition (blocking on the store's
//!    condvar while there is nothing to do)
//! 2. resolve the executable, apply the parallelism policy, launch
//! 3. poll for exit or cancellation every `poll_interval`
//! 4. hand the terminal state back to the store
//!
//! Failures in steps 2 and 3 end that job in `Error`; the loop carries on.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::controller::{LaunchRequest, ProcessController, RunningProcess};
use super::outcome::{JobFailure, decide_outcome};
use super::probe::{EnvironmentProbe, apply_parallel_policy};
use crate::engine::EngineConfig;
use crate::errors::{OrcaqError, Result};
use crate::fs::FileSystem;
use crate::job::Completion;
use crate::queue::store::{Dispatch, QueueStore};

pub const WORKER_THREAD_NAME: &str = "orcaq-worker";

/// Everything the worker thread owns.
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<QueueStore>,
    pub controller: Arc<dyn ProcessController>,
    pub probe: Arc<dyn EnvironmentProbe>,
    pub fs: Arc<dyn FileSystem>,
    pub config: EngineConfig,
}

/// Start the worker thread.
pub(crate) fn spawn_worker(ctx: WorkerContext) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || worker_loop(ctx))
        .map_err(|e| OrcaqError::WorkerSpawn(e.to_string()))
}

fn worker_loop(ctx: WorkerContext) {
    info!("worker loop started");

    while let Some(dispatch) = ctx.store.wait_for_next(ctx.config.idle_wake) {
        let completion = run_guarded(&ctx, &dispatch);
        ctx.store.finish_running(dispatch.id, completion);
    }

    info!("worker loop finished");
}

/// Run one job, converting a panic anywhere below into an `Error` outcome.
fn run_guarded(ctx: &WorkerContext, dispatch: &Dispatch) -> Completion {
    match panic::catch_unwind(AssertUnwindSafe(|| run_job(ctx, dispatch))) {
        Ok(completion) => completion,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(job_id = %dispatch.id, panic = %msg, "job execution panicked");
            Completion::error(None, JobFailure::Panicked(msg).to_string())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn resolve_executable(ctx: &WorkerContext, dispatch: &Dispatch) -> Option<PathBuf> {
    dispatch
        .spec
        .executable_path
        .as_ref()
        .or(ctx.config.default_executable.as_ref())
        .filter(|p| !p.as_os_str().is_empty())
        .cloned()
}

fn run_job(ctx: &WorkerContext, dispatch: &Dispatch) -> Completion {
    let id = dispatch.id;
    let spec = &dispatch.spec;

    let Some(executable) = resolve_executable(ctx, dispatch) else {
        warn!(job_id = %id, "no executable configured");
        return Completion::error(None, JobFailure::NoExecutable.to_string());
    };
    let exe_dir = executable.parent().filter(|d| !d.as_os_str().is_empty());

    if let Err(err) = apply_parallel_policy(
        ctx.config.parallel_policy,
        ctx.probe.as_ref(),
        ctx.fs.as_ref(),
        &spec.input_path,
        exe_dir,
    ) {
        let failure = JobFailure::InputPreparation {
            input: spec.input_path.clone(),
            reason: format!("{err:#}"),
        };
        warn!(job_id = %id, error = %failure, "input preparation failed");
        return Completion::error(None, failure.to_string());
    }

    let launched = LaunchRequest::for_job(id, spec, &executable)
        .and_then(|request| ctx.controller.spawn(&request));
    let mut process = match launched {
        Ok(process) => process,
        Err(err) => {
            let failure = JobFailure::SpawnFailure {
                executable,
                reason: format!("{err:#}"),
            };
            warn!(job_id = %id, error = %failure, "launch failed");
            return Completion::error(None, failure.to_string());
        }
    };

    info!(
        job_id = %id,
        pid = ?process.id(),
        executable = %executable.display(),
        "process launched"
    );
    supervise(ctx, dispatch, process.as_mut(), &spec.output_path)
}

/// Poll until the process exits or the job is cancelled.
///
/// Exit is always checked before the cancel flag, so a process that has
/// already finished is never reported as cancelled.
fn supervise(
    ctx: &WorkerContext,
    dispatch: &Dispatch,
    process: &mut dyn RunningProcess,
    output: &Path,
) -> Completion {
    let id = dispatch.id;

    loop {
        match process.try_wait() {
            Ok(Some(exit)) => {
                info!(job_id = %id, %exit, "process exited");
                return decide_outcome(ctx.fs.as_ref(), output, exit, ctx.config.error_tail_lines);
            }
            Ok(None) => {}
            Err(err) => {
                error!(job_id = %id, error = %format!("{err:#}"), "polling process failed");
                if let Err(kill_err) = process.terminate_tree() {
                    warn!(job_id = %id, error = %format!("{kill_err:#}"), "cleanup after poll failure failed");
                }
                return Completion::error(None, JobFailure::MonitorFailure(format!("{err:#}")).to_string());
            }
        }

        // Shutdown is only observed between jobs; a running job ends on its
        // own or through its cancel flag.
        if dispatch.cancel.load(Ordering::SeqCst) {
            info!(job_id = %id, "cancellation requested; terminating process tree");

            let diagnostic = match process.terminate_tree() {
                Ok(()) => None,
                Err(err) => {
                    warn!(job_id = %id, error = %format!("{err:#}"), "process tree termination failed");
                    Some(format!("failed to terminate process tree: {err:#}"))
                }
            };
            return Completion::cancelled(diagnostic);
        }

        debug!(job_id = %id, "process still running");
        thread::sleep(ctx.config.poll_interval);
    }
}
