#![allow(dead_code)]

use std::time::Duration;

use orcaq::JobEngine;
use orcaq::job::{Job, JobId, JobSpec, JobState};

pub use orcaq_test_utils::{
    EngineConfigBuilder, JobSpecBuilder, Script, ScriptedController, init_tracing,
    scripted_engine, wait_until,
};

/// Generous upper bound for anything that should happen "soon".
pub const WAIT: Duration = Duration::from_secs(5);

/// `/jobs/<name>` with output `/jobs/<stem>.out`.
pub fn job(name: &str) -> JobSpec {
    JobSpec::for_input(format!("/jobs/{name}"))
}

pub fn state_of(engine: &JobEngine, id: JobId) -> Option<JobState> {
    engine.get(id).map(|j| j.state)
}

pub fn wait_for_state(engine: &JobEngine, id: JobId, state: JobState) -> bool {
    wait_until(WAIT, || state_of(engine, id) == Some(state))
}

pub fn wait_terminal(engine: &JobEngine, id: JobId) -> Option<Job> {
    if wait_until(WAIT, || engine.get(id).is_some_and(|j| j.is_terminal())) {
        engine.get(id)
    } else {
        None
    }
}

pub fn wait_idle(engine: &JobEngine) -> bool {
    wait_until(WAIT, || engine.is_idle())
}
