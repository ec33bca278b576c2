//! End-to-end runs against real processes.
//!
//! `/bin/sh` stands in for the compute program: it is invoked exactly like
//! it, as `<executable> <input>`, so each input file here is a small shell
//! script.
#![cfg(unix)]

mod common;
use crate::common::{EngineConfigBuilder, init_tracing, wait_for_state, wait_terminal, wait_until, WAIT};

use std::error::Error;
use std::path::{Path, PathBuf};

use orcaq::JobEngine;
use orcaq::job::{JobSpec, JobState};

type TestResult = Result<(), Box<dyn Error>>;

fn sh_engine() -> Result<JobEngine, Box<dyn Error>> {
    Ok(JobEngine::new(
        EngineConfigBuilder::new().executable("/bin/sh").build(),
    )?)
}

fn write_input(dir: &Path, name: &str, script: &str) -> Result<JobSpec, Box<dyn Error>> {
    let input = dir.join(name);
    std::fs::write(&input, script)?;
    Ok(JobSpec::for_input(input))
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

#[test]
fn zero_exit_is_done_and_output_is_captured() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(dir.path(), "ok.inp", "echo hello from job\nexit 0\n")?;
    let output = spec.output_path.clone();
    let id = engine.submit(spec).id;

    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.exit_code, Some(0));
    assert!(read(&output).contains("hello from job"));
    Ok(())
}

#[test]
fn marker_in_output_overrides_nonzero_exit() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(
        dir.path(),
        "marker.inp",
        "echo '                             ****ORCA TERMINATED NORMALLY****'\nexit 3\n",
    )?;
    let id = engine.submit(spec).id;

    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.exit_code, Some(3));
    Ok(())
}

#[test]
fn nonzero_exit_without_marker_is_error_with_stderr_tail() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(dir.path(), "fail.inp", "echo 'SCF NOT CONVERGED' >&2\nexit 1\n")?;
    let id = engine.submit(spec).id;

    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Error);
    assert_eq!(job.exit_code, Some(1));
    let msg = job.error_message.ok_or("missing message")?;
    assert!(msg.contains("SCF NOT CONVERGED"), "stderr should land in the output: {msg}");
    Ok(())
}

#[test]
fn runs_in_input_directory_with_executable_dir_first_on_path() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(dir.path(), "env.inp", "pwd\necho \"PATH=$PATH\"\n")?;
    let output = spec.output_path.clone();
    let id = engine.submit(spec).id;
    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Done);

    let text = read(&output);
    let mut lines = text.lines();
    let cwd = PathBuf::from(lines.next().ok_or("no pwd line")?);
    assert_eq!(cwd.canonicalize()?, dir.path().canonicalize()?);

    let path_line = lines.next().ok_or("no PATH line")?;
    assert!(path_line.starts_with("PATH=/bin"), "{path_line}");
    Ok(())
}

#[test]
fn output_file_is_truncated_at_start() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(dir.path(), "fresh.inp", "echo fresh\n")?;
    std::fs::write(&spec.output_path, "stale output from an earlier run\n")?;
    let output = spec.output_path.clone();
    let id = engine.submit(spec).id;

    assert!(wait_terminal(&engine, id).is_some());
    let text = read(&output);
    assert!(text.contains("fresh"));
    assert!(!text.contains("stale"));
    Ok(())
}

#[test]
fn missing_executable_is_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = JobEngine::new(
        EngineConfigBuilder::new()
            .executable("/nonexistent/orca/orca")
            .build(),
    )?;

    let spec = write_input(dir.path(), "a.inp", "exit 0\n")?;
    let id = engine.submit(spec).id;

    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Error);
    assert!(job.error_message.ok_or("missing message")?.contains("failed to launch"));
    Ok(())
}

#[test]
fn output_is_readable_while_the_job_runs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(dir.path(), "slow.inp", "echo first cycle\nsleep 60\n")?;
    let id = engine.submit(spec).id;
    assert!(wait_for_state(&engine, id, JobState::Running));

    assert!(wait_until(WAIT, || {
        engine
            .read_output(id, 0)
            .is_ok_and(|chunk| chunk.text.contains("first cycle"))
    }));

    assert!(engine.cancel(id));
    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Cancelled);
    Ok(())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            !matches!(state, Some('Z') | Some('X') | None)
        }
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[test]
fn cancel_terminates_the_whole_process_tree() -> TestResult {
    use std::time::{Duration, Instant};

    init_tracing();
    let dir = tempfile::tempdir()?;
    let engine = sh_engine()?;

    let spec = write_input(
        dir.path(),
        "tree.inp",
        "sleep 60 &\necho $! > helper.pid\nwait\n",
    )?;
    let id = engine.submit(spec).id;
    assert!(wait_for_state(&engine, id, JobState::Running));

    let pid_file = dir.path().join("helper.pid");
    assert!(wait_until(WAIT, || !read(&pid_file).trim().is_empty()));
    let helper: u32 = read(&pid_file).trim().parse()?;
    assert!(process_alive(helper));

    let requested = Instant::now();
    assert!(engine.cancel(id));
    let job = wait_terminal(&engine, id).ok_or("never finished")?;
    assert_eq!(job.state, JobState::Cancelled);
    assert!(requested.elapsed() < Duration::from_secs(2));
    assert!(job.diagnostic.is_none(), "{:?}", job.diagnostic);

    assert!(
        wait_until(Duration::from_secs(2), || !process_alive(helper)),
        "helper process {helper} outlived its job"
    );
    Ok(())
}
