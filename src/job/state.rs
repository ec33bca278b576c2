// src/job/state.rs

//! Job lifecycle state machine.

use std::fmt;

/// Lifecycle state of a job.
///
/// Valid transitions:
///
/// ```text
/// Queued ──► Running ──► Done | Error | Cancelled
///    │
///    └──────────────────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Waiting in the pending partition.
    Queued,
    /// Dispatched to the external program; at most one job is in this state.
    Running,
    /// The program exited 0, or exited non-zero but wrote the success marker.
    Done,
    /// Spawn/monitor failure, or non-zero exit without the success marker.
    Error,
    /// Cancelled before or during execution.
    Cancelled,
}

impl JobState {
    /// Returns true for `Done`, `Error` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Cancelled)
                | (JobState::Running, JobState::Done)
                | (JobState::Running, JobState::Error)
                | (JobState::Running, JobState::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Error => "Error",
            JobState::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
