mod common;
use crate::common::{
    EngineConfigBuilder, Script, ScriptedController, init_tracing, job, scripted_engine,
    state_of, wait_for_state, wait_terminal,
};

use std::error::Error;
use std::time::{Duration, Instant};

use orcaq::job::{JobId, JobState};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn cancelling_a_queued_job_is_immediate() -> TestResult {
    init_tracing();

    let ctl = ScriptedController::new();
    ctl.script("blocker.inp", Script::RunUntilKilled);
    let engine = scripted_engine(&ctl, EngineConfigBuilder::new().build());

    let blocker = engine.submit(job("blocker.inp"));
    assert!(wait_for_state(&engine, blocker.id, JobState::Running));
    let queued = engine.submit(job("queued.inp"));

    assert!(engine.cancel(queued.id));

    // No poll needed: the store moves it to history synchronously.
    let job = engine.get(queued.id).ok_or("job vanished")?;
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.started_at.is_none());
    assert!(job.finished_at.is_some());

    engine.cancel(blocker.id);
    assert!(wait_terminal(&engine, blocker.id).is_some());
    assert!(!ctl.launched_inputs().contains(&"queued.inp".to_string()));
    Ok(())
}

#[test]
fn cancelling_a_running_job_kills_it_within_a_poll() -> TestResult {
    init_tracing();

    let ctl = ScriptedController::new();
    ctl.script("forever.inp", Script::RunUntilKilled);
    let engine = scripted_engine(
        &ctl,
        EngineConfigBuilder::new()
            .poll_interval(Duration::from_millis(50))
            .build(),
    );

    let forever = engine.submit(job("forever.inp"));
    let next = engine.submit(job("next.inp"));
    assert!(wait_for_state(&engine, forever.id, JobState::Running));

    let requested = Instant::now();
    assert!(engine.cancel(forever.id));
    assert!(engine.get(forever.id).ok_or("job vanished")?.cancel_requested);

    let job = wait_terminal(&engine, forever.id).ok_or("never finished")?;
    assert!(requested.elapsed() < Duration::from_secs(1));
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.error_message.is_none());
    assert!(job.diagnostic.is_none());
    assert_eq!(ctl.killed(), vec![forever.id]);

    // The queue keeps going afterwards.
    let next = wait_terminal(&engine, next.id).ok_or("next job never ran")?;
    assert_eq!(next.state, JobState::Done);
    assert_eq!(ctl.live(), 0);
    Ok(())
}

#[test]
fn failed_tree_kill_still_cancels_and_records_diagnostic() -> TestResult {
    init_tracing();

    let ctl = ScriptedController::new();
    ctl.script("stubborn.inp", Script::KillFails);
    let engine = scripted_engine(&ctl, EngineConfigBuilder::new().build());

    let stubborn = engine.submit(job("stubborn.inp"));
    assert!(wait_for_state(&engine, stubborn.id, JobState::Running));
    assert!(engine.cancel(stubborn.id));

    let job = wait_terminal(&engine, stubborn.id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Cancelled);
    let diagnostic = job.diagnostic.ok_or("missing diagnostic")?;
    assert!(diagnostic.contains("scripted kill failure"), "{diagnostic}");
    Ok(())
}

#[test]
fn natural_exit_beats_a_late_cancel() -> TestResult {
    init_tracing();

    // The process exits at ~150 ms; the worker next looks at ~400 ms; the
    // cancel lands in between. Exit is checked first, so the job is Done.
    let ctl = ScriptedController::new();
    ctl.script("racy.inp", Script::exit_after(0, Duration::from_millis(150)));
    let engine = scripted_engine(
        &ctl,
        EngineConfigBuilder::new()
            .poll_interval(Duration::from_millis(400))
            .build(),
    );

    let racy = engine.submit(job("racy.inp"));
    assert!(wait_for_state(&engine, racy.id, JobState::Running));
    std::thread::sleep(Duration::from_millis(250));

    assert!(engine.cancel(racy.id), "job should still be in the running slot");

    let job = wait_terminal(&engine, racy.id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.exit_code, Some(0));
    assert!(ctl.killed().is_empty());
    Ok(())
}

#[test]
fn cancel_of_finished_or_unknown_job_returns_false() -> TestResult {
    init_tracing();

    let ctl = ScriptedController::new();
    let engine = scripted_engine(&ctl, EngineConfigBuilder::new().build());

    let done = engine.submit(job("done.inp"));
    let job = wait_terminal(&engine, done.id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Done);

    assert!(!engine.cancel(done.id));
    assert_eq!(state_of(&engine, done.id), Some(JobState::Done));
    assert!(!engine.cancel(JobId(9_999)));
    Ok(())
}

#[test]
fn repeated_cancel_of_running_job_is_harmless() -> TestResult {
    init_tracing();

    let ctl = ScriptedController::new();
    ctl.script("forever.inp", Script::RunUntilKilled);
    let engine = scripted_engine(&ctl, EngineConfigBuilder::new().build());

    let forever = engine.submit(job("forever.inp"));
    assert!(wait_for_state(&engine, forever.id, JobState::Running));

    engine.cancel(forever.id);
    engine.cancel(forever.id);

    let job = wait_terminal(&engine, forever.id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(ctl.killed().len(), 1);
    Ok(())
}
