// src/config/validate.rs

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrcaqError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OrcaqError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let jobs = raw.jobs.iter().map(|job| job.to_spec()).collect();
        Ok(ConfigFile::new_unchecked(raw.engine, jobs))
    }
}

/// Run every check on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_engine_section(cfg)?;
    validate_jobs(cfg)?;
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.poll_interval_ms == 0 {
        return Err(OrcaqError::ConfigError(
            "[engine].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.idle_wake_ms == 0 {
        return Err(OrcaqError::ConfigError(
            "[engine].idle_wake_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg
        .engine
        .executable
        .as_ref()
        .is_some_and(|exe| exe.as_os_str().is_empty())
    {
        return Err(OrcaqError::ConfigError(
            "[engine].executable must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    let mut outputs: HashMap<PathBuf, usize> = HashMap::new();

    for (idx, job) in cfg.jobs.iter().enumerate() {
        let n = idx + 1;
        if job.input.as_os_str().is_empty() {
            return Err(OrcaqError::ConfigError(format!(
                "job #{n} has an empty `input`"
            )));
        }

        let output = job.effective_output();
        if output == job.input {
            return Err(OrcaqError::ConfigError(format!(
                "job #{n}: output {:?} is the same file as its input",
                output
            )));
        }

        if let Some(first) = outputs.insert(output.clone(), n) {
            return Err(OrcaqError::ConfigError(format!(
                "jobs #{first} and #{n} both write to {:?}",
                output
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn valid_config_converts() {
        let cfg = ConfigFile::try_from(parse(
            "[[job]]\ninput = \"a.inp\"\n[[job]]\ninput = \"b.inp\"\n",
        ))
        .unwrap();
        assert_eq!(cfg.jobs.len(), 2);
        assert_eq!(cfg.jobs[1].output_path, PathBuf::from("b.out"));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let err = ConfigFile::try_from(parse("[engine]\npoll_interval_ms = 0\n")).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn zero_idle_wake_rejected() {
        let err = ConfigFile::try_from(parse("[engine]\nidle_wake_ms = 0\n")).unwrap_err();
        assert!(err.to_string().contains("idle_wake_ms"));
    }

    #[test]
    fn duplicate_outputs_rejected() {
        let err = ConfigFile::try_from(parse(
            "[[job]]\ninput = \"a.inp\"\n[[job]]\ninput = \"b.inp\"\noutput = \"a.out\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("#1 and #2"), "{err}");
    }

    #[test]
    fn output_equal_to_input_rejected() {
        let err = ConfigFile::try_from(parse(
            "[[job]]\ninput = \"a.inp\"\noutput = \"a.inp\"\n",
        ))
        .unwrap_err();
        assert!(matches!(err, OrcaqError::ConfigError(_)));
    }

    #[test]
    fn empty_input_rejected() {
        let err = ConfigFile::try_from(parse("[[job]]\ninput = \"\"\n")).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn no_jobs_is_fine() {
        assert!(validate_config(&parse("[engine]\nexecutable = \"orca\"\n")).is_ok());
    }
}
