// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{DEFAULT_ERROR_TAIL_LINES, EngineConfig};
use crate::job::{JobSpec, default_output_path};
use crate::types::ParallelPolicy;

/// Job file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// executable = "/opt/orca/orca"
/// poll_interval_ms = 200
///
/// [[job]]
/// input = "water.inp"
///
/// [[job]]
/// input = "benzene.inp"
/// output = "results/benzene.out"
/// ```
///
/// Both sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// `[[job]]` entries, in run order.
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobEntry>,
}

impl RawConfigFile {
    /// Resolve every relative path against `base_dir` (normally the
    /// directory the file was loaded from).
    pub fn resolve_relative_to(mut self, base_dir: &Path) -> Self {
        if let Some(exe) = self.engine.executable.take() {
            self.engine.executable = Some(resolve_executable(base_dir, exe));
        }
        for job in &mut self.jobs {
            job.input = base_dir.join(&job.input);
            job.output = job.output.take().map(|out| base_dir.join(out));
            job.executable = job.executable.take().map(|exe| resolve_executable(base_dir, exe));
        }
        self
    }
}

/// A bare program name stays a `PATH` lookup.
fn resolve_executable(base_dir: &Path, exe: PathBuf) -> PathBuf {
    if exe.components().count() > 1 {
        base_dir.join(exe)
    } else {
        exe
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineSection {
    /// Default executable for jobs that don't name one.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_idle_wake_ms")]
    pub idle_wake_ms: u64,

    /// Output lines quoted in a failed job's error message.
    #[serde(default = "default_error_tail_lines")]
    pub error_tail_lines: usize,

    /// `"preserve"` (default) or `"serial-when-unavailable"`.
    #[serde(default)]
    pub parallel_policy: ParallelPolicy,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_idle_wake_ms() -> u64 {
    500
}

fn default_error_tail_lines() -> usize {
    DEFAULT_ERROR_TAIL_LINES
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            executable: None,
            poll_interval_ms: default_poll_interval_ms(),
            idle_wake_ms: default_idle_wake_ms(),
            error_tail_lines: default_error_tail_lines(),
            parallel_policy: ParallelPolicy::default(),
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            idle_wake: Duration::from_millis(self.idle_wake_ms),
            default_executable: self.executable.clone(),
            error_tail_lines: self.error_tail_lines,
            parallel_policy: self.parallel_policy,
        }
    }
}

/// One `[[job]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobEntry {
    pub input: PathBuf,

    /// Defaults to the input with an `.out` extension.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Per-job override of `[engine].executable`.
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

impl JobEntry {
    pub fn effective_output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }

    pub fn to_spec(&self) -> JobSpec {
        JobSpec {
            input_path: self.input.clone(),
            output_path: self.effective_output(),
            executable_path: self.executable.clone(),
        }
    }
}

/// Validated job file. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub jobs: Vec<JobSpec>,
}

impl ConfigFile {
    /// Construct without validation; `TryFrom<RawConfigFile>` is the
    /// checked path.
    pub(crate) fn new_unchecked(engine: EngineSection, jobs: Vec<JobSpec>) -> Self {
        Self { engine, jobs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        assert_eq!(raw.engine, EngineSection::default());
        assert!(raw.jobs.is_empty());

        let cfg = raw.engine.to_engine_config();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parses_engine_and_jobs() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [engine]
            executable = "/opt/orca/orca"
            poll_interval_ms = 50
            parallel_policy = "serial-when-unavailable"

            [[job]]
            input = "water.inp"

            [[job]]
            input = "benzene.inp"
            output = "out/benzene.log"
            executable = "orca6"
            "#,
        )
        .unwrap();

        assert_eq!(raw.engine.poll_interval_ms, 50);
        assert_eq!(raw.engine.idle_wake_ms, 500);
        assert_eq!(raw.engine.parallel_policy, ParallelPolicy::SerialWhenUnavailable);
        assert_eq!(raw.jobs.len(), 2);
        assert_eq!(raw.jobs[0].effective_output(), PathBuf::from("water.out"));
        assert_eq!(raw.jobs[1].to_spec().output_path, PathBuf::from("out/benzene.log"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [engine]
            executable = "bin/orca"

            [[job]]
            input = "water.inp"
            executable = "orca"
            "#,
        )
        .unwrap();

        let raw = raw.resolve_relative_to(Path::new("/work"));
        assert_eq!(raw.engine.executable, Some(PathBuf::from("/work/bin/orca")));
        assert_eq!(raw.jobs[0].input, PathBuf::from("/work/water.inp"));
        assert_eq!(raw.jobs[0].executable, Some(PathBuf::from("orca")));
        assert_eq!(raw.jobs[0].effective_output(), PathBuf::from("/work/water.out"));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = toml::from_str::<RawConfigFile>("[engine]\nparallel_policy = \"maybe\"\n");
        assert!(err.is_err());
    }
}
