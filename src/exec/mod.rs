// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`controller`] defines the `ProcessController` / `RunningProcess` seam
//!   and the `std::process` implementation.
//! - [`tree_kill`] holds the per-OS process-tree setup and termination.
//! - [`outcome`] maps an exit status plus output file to a terminal state.
//! - [`probe`] checks for a parallel runtime and rewrites inputs if asked.
//! - [`tail`] reads output files incrementally.
//! - [`worker`] is the loop that runs queued jobs one at a time.

pub mod controller;
pub mod outcome;
pub mod probe;
pub mod tail;
pub mod tree_kill;
pub(crate) mod worker;

pub use controller::{
    ExitSummary, LaunchRequest, ProcessController, RunningProcess, SystemProcessController,
};
pub use outcome::{JobFailure, SUCCESS_MARKER};
pub use probe::{EnvironmentProbe, FixedProbe, PathProbe};
pub use tail::OutputChunk;
