// src/config/mod.rs

//! Job-file loading and validation for orcaq.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a job file from disk (`loader.rs`).
//! - Validate basic invariants like distinct outputs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, EngineSection, JobEntry, RawConfigFile};
pub use validate::validate_config;
