// src/exec/probe.rs

//! Environment probing and the input-file parallelism rewrite.
//!
//! Parallel runs of the compute program need an MPI launcher next to it or
//! on `PATH`. When none is available and the engine is configured with
//! [`ParallelPolicy::SerialWhenUnavailable`], the input is rewritten to run
//! on a single process instead of failing at startup.

use std::ffi::OsString;
use std::fmt::Debug;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::types::ParallelPolicy;

/// Reports whether a parallel runtime is usable for a given executable.
pub trait EnvironmentProbe: Send + Sync + Debug {
    fn parallel_available(&self, executable_dir: Option<&Path>) -> bool;
}

#[cfg(windows)]
const LAUNCHERS: &[&str] = &["mpiexec.exe", "mpirun.exe"];
#[cfg(not(windows))]
const LAUNCHERS: &[&str] = &["mpirun", "mpiexec"];

/// Looks for an MPI launcher in the executable's directory, then on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct PathProbe {
    /// Overrides the process `PATH` when set.
    path_override: Option<OsString>,
}

impl PathProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(path: impl Into<OsString>) -> Self {
        Self {
            path_override: Some(path.into()),
        }
    }
}

impl EnvironmentProbe for PathProbe {
    fn parallel_available(&self, executable_dir: Option<&Path>) -> bool {
        let path_var = self
            .path_override
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();

        let found = executable_dir
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::split_paths(&path_var))
            .flat_map(|dir| LAUNCHERS.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file());

        match &found {
            Some(launcher) => debug!(launcher = %launcher.display(), "parallel runtime found"),
            None => debug!("no parallel runtime found"),
        }
        found.is_some()
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub bool);

impl EnvironmentProbe for FixedProbe {
    fn parallel_available(&self, _executable_dir: Option<&Path>) -> bool {
        self.0
    }
}

static PAL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)%pal\b.*?\bend\b").expect("valid %pal block regex"));
static NPROCS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(nprocs\s+)(\d+)").expect("valid nprocs regex"));
static PAL_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bPAL(\d+)\b").expect("valid PALn regex"));

fn more_than_one(digits: &str) -> bool {
    digits.parse::<u64>().map(|n| n > 1).unwrap_or(true)
}

/// Rewrite an input to single-process form.
///
/// - `nprocs N` inside `%pal ... end` becomes `nprocs 1`
/// - `PALn` on `!` keyword lines is dropped
///
/// Returns `None` when nothing needed changing.
pub fn force_serial(text: &str) -> Option<String> {
    let blocks_rewritten = PAL_BLOCK.replace_all(text, |block: &Captures| {
        NPROCS
            .replace_all(&block[0], |c: &Captures| {
                if more_than_one(&c[2]) {
                    format!("{}1", &c[1])
                } else {
                    c[0].to_string()
                }
            })
            .into_owned()
    });

    let mut out = String::with_capacity(text.len());
    for line in blocks_rewritten.split_inclusive('\n') {
        if line.trim_start().starts_with('!') {
            let cleaned = PAL_KEYWORD.replace_all(line, |c: &Captures| {
                if more_than_one(&c[1]) {
                    String::new()
                } else {
                    c[0].to_string()
                }
            });
            out.push_str(&cleaned);
        } else {
            out.push_str(line);
        }
    }

    (out != text).then_some(out)
}

/// Apply `policy` to the input file before launch.
///
/// Returns `true` if the file was rewritten.
pub fn apply_parallel_policy(
    policy: ParallelPolicy,
    probe: &dyn EnvironmentProbe,
    fs: &dyn FileSystem,
    input: &Path,
    executable_dir: Option<&Path>,
) -> Result<bool> {
    if policy == ParallelPolicy::Preserve || probe.parallel_available(executable_dir) {
        return Ok(false);
    }

    let bytes = fs.read(input)?;
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("input {:?} is not valid UTF-8", input))?;

    match force_serial(text) {
        Some(serial) => {
            fs.write(input, serial.as_bytes())?;
            warn!(
                input = %input.display(),
                "no parallel runtime available; input rewritten to run on a single process"
            );
            Ok(true)
        }
        None => Ok(false),
    }
}
