use std::str::FromStr;
use serde::Deserialize;

/// What to do with an input's parallelism directives before launch.
///
/// - `Preserve`: never touch the input file (default).
/// - `SerialWhenUnavailable`: if the environment probe cannot find a
///   parallel runtime (MPI), rewrite `nprocs N` / `PALn` to single-process
///   form so the run does not fail at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParallelPolicy {
    Preserve,
    SerialWhenUnavailable,
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        ParallelPolicy::Preserve
    }
}

impl FromStr for ParallelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "preserve" => Ok(ParallelPolicy::Preserve),
            "serial-when-unavailable" => Ok(ParallelPolicy::SerialWhenUnavailable),
            other => Err(format!(
                "invalid parallel_policy: {other} (expected \"preserve\" or \"serial-when-unavailable\")"
            )),
        }
    }
}
