// src/exec/outcome.rs

//! Deciding how a finished process maps to a terminal job state.
//!
//! The compute program does not always exit with 0 after a successful run,
//! so a non-zero exit is still `Done` when the output file contains the
//! normal-termination banner. The output is only read after the process has
//! exited.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::controller::ExitSummary;
use crate::fs::FileSystem;
use crate::job::Completion;

/// Banner printed by the compute program at the end of a successful run.
pub const SUCCESS_MARKER: &str = "ORCA TERMINATED NORMALLY";

/// Why a job ended in `Error`.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("no executable configured for this job and no engine default")]
    NoExecutable,

    #[error("failed to prepare input {input:?}: {reason}")]
    InputPreparation { input: PathBuf, reason: String },

    #[error("failed to launch {executable:?}: {reason}")]
    SpawnFailure { executable: PathBuf, reason: String },

    #[error("process ended with {status} and the output has no normal-termination marker{tail}")]
    AbnormalExit { status: ExitSummary, tail: String },

    #[error("lost track of the running process: {0}")]
    MonitorFailure(String),

    #[error("worker panicked while running the job: {0}")]
    Panicked(String),
}

/// Does any line of the output contain [`SUCCESS_MARKER`]?
pub fn output_has_marker(fs: &dyn FileSystem, output: &Path) -> anyhow::Result<bool> {
    let bytes = fs.read(output)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.lines().any(|line| line.contains(SUCCESS_MARKER)))
}

/// Last `lines` lines of the output, formatted for an error message.
///
/// Empty when the output is empty, unreadable, or `lines` is zero.
pub fn output_tail(fs: &dyn FileSystem, output: &Path, lines: usize) -> String {
    if lines == 0 {
        return String::new();
    }
    let Ok(bytes) = fs.read(output) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    if all.iter().all(|l| l.trim().is_empty()) {
        return String::new();
    }
    let start = all.len().saturating_sub(lines);
    format!(
        "\n--- last {} line(s) of {} ---\n{}",
        all.len() - start,
        output.display(),
        all[start..].join("\n")
    )
}

/// Map a process exit to the job's terminal state.
pub fn decide_outcome(
    fs: &dyn FileSystem,
    output: &Path,
    exit: ExitSummary,
    tail_lines: usize,
) -> Completion {
    if exit.success() {
        return Completion::done(exit.code);
    }

    match output_has_marker(fs, output) {
        Ok(true) => {
            info!(
                output = %output.display(),
                %exit,
                "non-zero exit but output reports normal termination; treating as success"
            );
            Completion::done(exit.code)
        }
        Ok(false) => {
            let failure = JobFailure::AbnormalExit {
                status: exit,
                tail: output_tail(fs, output, tail_lines),
            };
            Completion::error(exit.code, failure.to_string())
        }
        Err(err) => {
            warn!(output = %output.display(), error = %format!("{err:#}"), "output not readable");
            let failure = JobFailure::AbnormalExit {
                status: exit,
                tail: format!(" (output unreadable: {err:#})"),
            };
            Completion::error(exit.code, failure.to_string())
        }
    }
}
