// src/engine/mod.rs

//! Job engine facade.
//!
//! [`JobEngine`] ties together:
//! - the queue store (pending / running / history partitions)
//! - the single worker thread that runs jobs
//! - the process controller, environment probe and filesystem seams
//!
//! All operations are callable from any thread. None of them block on the
//! external process; only [`JobEngine::stop`] and [`JobEngine::stop_now`]
//! wait, for the worker to exit.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::errors::{OrcaqError, Result};
use crate::exec::controller::{ProcessController, SystemProcessController};
use crate::exec::probe::{EnvironmentProbe, PathProbe};
use crate::exec::tail::{OutputChunk, read_chunk};
use crate::exec::worker::{WorkerContext, spawn_worker};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::{Job, JobId, JobSpec};
use crate::queue::notify::NotificationSink;
use crate::queue::store::{QueueCounts, QueueStore};
use crate::types::ParallelPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_IDLE_WAKE: Duration = Duration::from_millis(500);
pub const DEFAULT_ERROR_TAIL_LINES: usize = 20;

/// Runtime options for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How often the worker checks the running process.
    pub poll_interval: Duration,
    /// Upper bound on how long the idle worker sleeps before re-checking
    /// for shutdown.
    pub idle_wake: Duration,
    /// Used for jobs submitted without an executable.
    pub default_executable: Option<PathBuf>,
    /// Lines of output quoted in an `Error` job's message.
    pub error_tail_lines: usize,
    pub parallel_policy: ParallelPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_wake: DEFAULT_IDLE_WAKE,
            default_executable: None,
            error_tail_lines: DEFAULT_ERROR_TAIL_LINES,
            parallel_policy: ParallelPolicy::default(),
        }
    }
}

/// Sequential job runner.
///
/// Dropping the engine cancels the running job and stops (see [`JobEngine::stop_now`]).
pub struct JobEngine {
    store: Arc<QueueStore>,
    fs: Arc<dyn FileSystem>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: EngineConfig,
}

impl fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEngine")
            .field("config", &self.config)
            .field("counts", &self.store.counts())
            .finish_non_exhaustive()
    }
}

impl JobEngine {
    /// Engine with the real process controller, `PATH` probe and filesystem.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(SystemProcessController),
            Arc::new(PathProbe::new()),
            Arc::new(RealFileSystem),
        )
    }

    /// Engine with injected seams; the worker thread starts immediately.
    pub fn with_parts(
        config: EngineConfig,
        controller: Arc<dyn ProcessController>,
        probe: Arc<dyn EnvironmentProbe>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        if config.poll_interval.is_zero() || config.idle_wake.is_zero() {
            return Err(OrcaqError::ConfigError(
                "poll_interval and idle_wake must be greater than zero".to_string(),
            ));
        }

        let store = Arc::new(QueueStore::new());
        let handle = spawn_worker(WorkerContext {
            store: Arc::clone(&store),
            controller,
            probe,
            fs: Arc::clone(&fs),
            config: config.clone(),
        })?;

        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            executable = ?config.default_executable,
            "job engine started"
        );

        Ok(Self {
            store,
            fs,
            worker: Mutex::new(Some(handle)),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue a job. It runs after every job already pending.
    pub fn submit(&self, spec: JobSpec) -> Job {
        self.store.submit(spec)
    }

    /// Cancel a queued or running job. `false` if it is finished or unknown.
    pub fn cancel(&self, id: JobId) -> bool {
        self.store.cancel(id)
    }

    /// Move a pending job to `new_index` in the queue.
    pub fn reorder(&self, id: JobId, new_index: usize) -> bool {
        self.store.reorder(id, new_index)
    }

    pub fn remove_completed(&self, id: JobId) -> bool {
        self.store.remove_completed(id)
    }

    pub fn remove_all_finished(&self) -> usize {
        self.store.remove_all_finished()
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.store.snapshot()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.store.get(id)
    }

    pub fn counts(&self) -> QueueCounts {
        self.store.counts()
    }

    /// Nothing pending and nothing running.
    pub fn is_idle(&self) -> bool {
        self.store.is_idle()
    }

    /// Read a job's output from byte `offset`.
    pub fn read_output(&self, id: JobId, offset: u64) -> Result<OutputChunk> {
        let path = self
            .store
            .output_path_of(id)
            .ok_or(OrcaqError::JobNotFound(id))?;
        Ok(read_chunk(self.fs.as_ref(), &path, offset)?)
    }

    /// Install the sink called after every queue change.
    pub fn set_notifier(&self, sink: impl NotificationSink + 'static) {
        self.store.set_notifier(Arc::new(sink));
    }

    pub fn clear_notifier(&self) {
        self.store.clear_notifier();
    }

    pub fn is_stopped(&self) -> bool {
        self.store.is_shutdown()
    }

    /// Stop dequeuing and wait for the worker to exit.
    ///
    /// A running job is left to finish with its real outcome; pending jobs
    /// stay `Queued`. Safe to call more than once.
    pub fn stop(&self) {
        self.store.request_shutdown();
        self.join_worker();
    }

    /// Like [`stop`](Self::stop), but the running job is cancelled first, so
    /// its process tree is killed within one poll interval.
    pub fn stop_now(&self) {
        self.store.request_shutdown();
        if let Some(id) = self.store.running_id() {
            info!(job_id = %id, "cancelling running job before shutdown");
            self.store.cancel(id);
        }
        self.join_worker();
    }

    fn join_worker(&self) {

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            warn!("engine stopped from the worker thread; not joining");
            return;
        }

        if handle.join().is_err() {
            error!("worker thread panicked");
        } else {
            info!("job engine stopped");
        }
    }
}

impl Drop for JobEngine {
    fn drop(&mut self) {
        self.stop_now();
    }
}
