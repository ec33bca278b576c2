// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::job::{JobId, JobState};

#[derive(Error, Debug)]
pub enum OrcaqError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Failed to start worker thread: {0}")]
    WorkerSpawn(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OrcaqError>;
