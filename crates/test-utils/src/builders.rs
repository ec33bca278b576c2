#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use orcaq::engine::EngineConfig;
use orcaq::job::JobSpec;
use orcaq::types::ParallelPolicy;

/// Builder for `JobSpec` to simplify test setup.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    /// Output defaults to `<input>.out`.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            spec: JobSpec::for_input(input),
        }
    }

    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.spec.output_path = output.into();
        self
    }

    pub fn executable(mut self, exe: impl Into<PathBuf>) -> Self {
        self.spec.executable_path = Some(exe.into());
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for `EngineConfig` with test-friendly (fast) defaults.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 10 ms polling, 20 ms idle wake, executable `/opt/orca/orca`.
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                poll_interval: Duration::from_millis(10),
                idle_wake: Duration::from_millis(20),
                default_executable: Some(PathBuf::from("/opt/orca/orca")),
                ..EngineConfig::default()
            },
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn idle_wake(mut self, wake: Duration) -> Self {
        self.config.idle_wake = wake;
        self
    }

    pub fn executable(mut self, exe: impl Into<PathBuf>) -> Self {
        self.config.default_executable = Some(exe.into());
        self
    }

    pub fn no_executable(mut self) -> Self {
        self.config.default_executable = None;
        self
    }

    pub fn error_tail_lines(mut self, lines: usize) -> Self {
        self.config.error_tail_lines = lines;
        self
    }

    pub fn parallel_policy(mut self, policy: ParallelPolicy) -> Self {
        self.config.parallel_policy = policy;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
