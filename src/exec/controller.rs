// src/exec/controller.rs

//! Process launch abstraction.
//!
//! The worker talks to a [`ProcessController`] instead of `std::process`
//! directly, so tests can swap in a scripted fake while production uses
//! [`SystemProcessController`].
//!
//! The launched command line is always `[executable, input]`. Stdout and
//! stderr both go to the job's output file, which is truncated first. The
//! working directory is the input's directory, and the executable's own
//! directory is prepended to `PATH` so helper binaries shipped alongside it
//! are found.

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

use super::tree_kill::{configure_process_tree, kill_tree};
use crate::job::{JobId, JobSpec};

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

impl ExitSummary {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "no exit code (terminated by signal)"),
        }
    }
}

/// Everything needed to start one job's process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub job_id: JobId,
    pub executable: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub working_dir: PathBuf,
    /// Directory to put in front of the inherited `PATH`, if any.
    pub path_prefix: Option<PathBuf>,
}

impl LaunchRequest {
    /// Build the request for `spec`, resolving relative paths against the
    /// current directory so they survive the change of working directory.
    pub fn for_job(job_id: JobId, spec: &JobSpec, executable: &Path) -> Result<Self> {
        let input = std::path::absolute(&spec.input_path)
            .with_context(|| format!("resolving input path {:?}", spec.input_path))?;
        let output = std::path::absolute(&spec.output_path)
            .with_context(|| format!("resolving output path {:?}", spec.output_path))?;

        // A bare program name is left for PATH lookup.
        let executable = if has_directory_part(executable) {
            std::path::absolute(executable)
                .with_context(|| format!("resolving executable path {:?}", executable))?
        } else {
            executable.to_path_buf()
        };

        let working_dir = match input.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::current_dir().context("reading current directory")?,
        };

        let path_prefix = executable
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);

        Ok(Self {
            job_id,
            executable,
            input,
            output,
            working_dir,
            path_prefix,
        })
    }
}

fn has_directory_part(path: &Path) -> bool {
    path.parent().is_some_and(|p| !p.as_os_str().is_empty())
}

/// `dir` followed by every entry of `current`.
pub fn prepend_to_path(dir: &Path, current: Option<OsString>) -> Result<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(current) = current {
        entries.extend(std::env::split_paths(&current));
    }
    std::env::join_paths(entries).context("building PATH for child process")
}

/// A launched process, as seen by the worker's poll loop.
pub trait RunningProcess: Send {
    /// OS process id, when there is one.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> Result<Option<ExitSummary>>;

    /// Kill the process and all of its descendants. Best effort: an error
    /// means some part of the tree may have survived.
    fn terminate_tree(&mut self) -> Result<()>;
}

/// Starts processes for the worker.
pub trait ProcessController: Send + Sync + fmt::Debug {
    fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn RunningProcess>>;
}

/// Production controller backed by `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessController;

impl ProcessController for SystemProcessController {
    fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn RunningProcess>> {
        let stdout = File::create(&request.output)
            .with_context(|| format!("creating output file {:?}", request.output))?;
        let stderr = stdout
            .try_clone()
            .with_context(|| format!("duplicating handle for {:?}", request.output))?;

        let mut cmd = Command::new(&request.executable);
        cmd.arg(&request.input)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        if let Some(prefix) = &request.path_prefix {
            cmd.env("PATH", prepend_to_path(prefix, std::env::var_os("PATH"))?);
        }
        configure_process_tree(&mut cmd);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning {:?}", request.executable))?;

        debug!(
            job_id = %request.job_id,
            pid = child.id(),
            cwd = %request.working_dir.display(),
            "child process spawned"
        );
        Ok(Box::new(SystemProcess { child }))
    }
}

struct SystemProcess {
    child: Child,
}

impl RunningProcess for SystemProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn try_wait(&mut self) -> Result<Option<ExitSummary>> {
        let status = self
            .child
            .try_wait()
            .with_context(|| format!("polling process {}", self.child.id()))?;
        Ok(status.map(|s| ExitSummary { code: s.code() }))
    }

    fn terminate_tree(&mut self) -> Result<()> {
        kill_tree(&mut self.child)
    }
}
