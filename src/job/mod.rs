// src/job/mod.rs

//! Job data model.
//!
//! - [`JobSpec`] is what a caller submits: input, output and (optionally)
//!   the executable to run.
//! - [`Job`] is the caller-facing, point-in-time copy of a job's identity and
//!   lifecycle state. Mutating a `Job` never affects the queue.
//! - `JobRecord` (crate-private) is the store's owned record. It is the only
//!   place where state transitions happen, and it does not hold the process
//!   handle: that lives on the worker's stack while the job runs.

pub mod state;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local, TimeDelta};
use tracing::debug;

use crate::errors::{OrcaqError, Result};

pub use state::JobState;

/// Process-unique job identifier, allocated by the queue at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to run the external program on one input/output pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Executable for this job. `None` means "use the engine default",
    /// resolved when the job is dispatched.
    pub executable_path: Option<PathBuf>,
}

impl JobSpec {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            executable_path: None,
        }
    }

    /// Spec whose output sits next to the input with an `.out` extension.
    pub fn for_input(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let output_path = default_output_path(&input_path);
        Self::new(input_path, output_path)
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(executable.into());
        self
    }
}

/// `water.inp` -> `water.out`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("out")
}

/// Caller-facing snapshot of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub executable_path: Option<PathBuf>,
    pub state: JobState,
    pub submitted_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    /// Only set in the `Error` state.
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    /// Extra diagnostics that don't change the outcome (e.g. a failed
    /// process-tree kill on a cancelled job).
    pub diagnostic: Option<String>,
    pub cancel_requested: bool,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Wall-clock run time: up to now while running, up to the finish time
    /// once terminal. `None` if the job never started.
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.elapsed_at(Local::now())
    }

    pub fn elapsed_at(&self, now: DateTime<Local>) -> Option<TimeDelta> {
        let started = self.started_at?;
        match self.state {
            JobState::Running => Some(now - started),
            _ => self.finished_at.map(|finished| finished - started),
        }
    }
}

/// Terminal outcome recorded by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub diagnostic: Option<String>,
}

impl Completion {
    pub fn done(exit_code: Option<i32>) -> Self {
        Self {
            state: JobState::Done,
            exit_code,
            error_message: None,
            diagnostic: None,
        }
    }

    pub fn error(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            exit_code,
            error_message: Some(message.into()),
            diagnostic: None,
        }
    }

    pub fn cancelled(diagnostic: Option<String>) -> Self {
        Self {
            state: JobState::Cancelled,
            exit_code: None,
            error_message: None,
            diagnostic,
        }
    }
}

/// The store's owned record for one job.
#[derive(Debug)]
pub(crate) struct JobRecord {
    job: Job,
    cancel: Arc<AtomicBool>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, spec: JobSpec) -> Self {
        Self {
            job: Job {
                id,
                input_path: spec.input_path,
                output_path: spec.output_path,
                executable_path: spec.executable_path,
                state: JobState::Queued,
                submitted_at: Local::now(),
                started_at: None,
                finished_at: None,
                error_message: None,
                exit_code: None,
                diagnostic: None,
                cancel_requested: false,
            },
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.job.id
    }

    pub(crate) fn state(&self) -> JobState {
        self.job.state
    }

    pub(crate) fn spec(&self) -> JobSpec {
        JobSpec {
            input_path: self.job.input_path.clone(),
            output_path: self.job.output_path.clone(),
            executable_path: self.job.executable_path.clone(),
        }
    }

    pub(crate) fn output_path(&self) -> &Path {
        &self.job.output_path
    }

    /// Shared flag the worker polls while this job runs.
    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Point-in-time copy for callers.
    pub(crate) fn view(&self) -> Job {
        let mut job = self.job.clone();
        job.cancel_requested = self.cancel.load(Ordering::SeqCst);
        job
    }

    /// Move to `next`, stamping `started_at` / `finished_at`.
    pub(crate) fn transition(&mut self, next: JobState) -> Result<()> {
        let from = self.job.state;
        if !from.can_transition_to(next) {
            return Err(OrcaqError::InvalidTransition { from, to: next });
        }

        let now = Local::now();
        if next == JobState::Running {
            self.job.started_at = Some(now);
        }
        if next.is_terminal() {
            self.job.finished_at = Some(now);
        }
        self.job.state = next;

        debug!(job_id = %self.job.id, %from, to = %next, "job state transition");
        Ok(())
    }

    /// Apply a terminal [`Completion`].
    pub(crate) fn finish(&mut self, completion: Completion) -> Result<()> {
        self.transition(completion.state)?;
        self.job.exit_code = completion.exit_code;
        self.job.error_message = completion.error_message;
        self.job.diagnostic = completion.diagnostic;
        Ok(())
    }
}
