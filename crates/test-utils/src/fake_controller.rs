use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use orcaq::exec::{ExitSummary, LaunchRequest, ProcessController, RunningProcess};
use orcaq::fs::mock::MockFileSystem;
use orcaq::job::JobId;

/// What a fake process does once launched.
#[derive(Debug, Clone)]
pub enum Script {
    /// Append `output` to the output file and exit with `code` once `after`
    /// has passed since launch.
    Exit {
        code: i32,
        output: String,
        after: Duration,
    },
    /// Never exits on its own.
    RunUntilKilled,
    /// Never exits on its own, and killing it fails.
    KillFails,
    /// `spawn` returns this error.
    SpawnError(String),
    /// `spawn` panics.
    SpawnPanic,
    /// `try_wait` errors.
    PollError,
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Script::Exit {
            code,
            output: String::new(),
            after: Duration::ZERO,
        }
    }

    pub fn exit_with_output(code: i32, output: impl Into<String>) -> Self {
        Script::Exit {
            code,
            output: output.into(),
            after: Duration::ZERO,
        }
    }

    pub fn exit_after(code: i32, after: Duration) -> Self {
        Script::Exit {
            code,
            output: String::new(),
            after,
        }
    }
}

#[derive(Debug)]
struct Inner {
    fs: MockFileSystem,
    /// Keyed by input file name.
    scripts: Mutex<HashMap<String, Script>>,
    default: Mutex<Script>,
    launches: Mutex<Vec<LaunchRequest>>,
    killed: Mutex<Vec<JobId>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// A fake `ProcessController` that:
/// - records every launch request
/// - runs each job according to a [`Script`] chosen by input file name
/// - writes "process output" into a shared [`MockFileSystem`]
/// - tracks how many fake processes were alive at once
#[derive(Debug, Clone)]
pub struct ScriptedController {
    inner: Arc<Inner>,
}

impl Default for ScriptedController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedController {
    /// Every job exits 0 unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                fs: MockFileSystem::new(),
                scripts: Mutex::new(HashMap::new()),
                default: Mutex::new(Script::exit(0)),
                launches: Mutex::new(Vec::new()),
                killed: Mutex::new(Vec::new()),
                live: AtomicUsize::new(0),
                max_live: AtomicUsize::new(0),
            }),
        }
    }

    /// Script the job whose input file is named `input_name`.
    pub fn script(&self, input_name: &str, script: Script) -> &Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(input_name.to_string(), script);
        self
    }

    pub fn set_default(&self, script: Script) {
        *self.inner.default.lock().unwrap() = script;
    }

    /// Filesystem the fake processes write to; hand it to the engine.
    pub fn fs(&self) -> MockFileSystem {
        self.inner.fs.clone()
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.inner.launches.lock().unwrap().clone()
    }

    /// Input file names, in launch order.
    pub fn launched_inputs(&self) -> Vec<String> {
        self.launches().iter().map(|r| file_name(&r.input)).collect()
    }

    pub fn killed(&self) -> Vec<JobId> {
        self.inner.killed.lock().unwrap().clone()
    }

    /// Fake processes currently alive.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Most fake processes ever alive at the same time.
    pub fn max_live(&self) -> usize {
        self.inner.max_live.load(Ordering::SeqCst)
    }

    fn script_for(&self, request: &LaunchRequest) -> Script {
        let name = file_name(&request.input);
        self.inner
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.inner.default.lock().unwrap().clone())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ProcessController for ScriptedController {
    fn spawn(&self, request: &LaunchRequest) -> Result<Box<dyn RunningProcess>> {
        self.inner.launches.lock().unwrap().push(request.clone());

        let script = self.script_for(request);
        match &script {
            Script::SpawnError(msg) => return Err(anyhow!("{msg}")),
            Script::SpawnPanic => panic!("scripted spawn panic"),
            _ => {}
        }

        // Same truncation the real controller does.
        self.inner.fs.add_file(&request.output, "");

        let live = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeProcess {
            inner: Arc::clone(&self.inner),
            script,
            job_id: request.job_id,
            output: request.output.clone(),
            started: Instant::now(),
            finished: false,
        }))
    }
}

struct FakeProcess {
    inner: Arc<Inner>,
    script: Script,
    job_id: JobId,
    output: PathBuf,
    started: Instant,
    finished: bool,
}

impl FakeProcess {
    fn mark_finished(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl RunningProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> Result<Option<ExitSummary>> {
        match self.script.clone() {
            Script::Exit { code, output, after } => {
                if self.started.elapsed() < after {
                    return Ok(None);
                }
                if !self.finished {
                    self.inner.fs.append(&self.output, output.as_bytes());
                    self.mark_finished();
                }
                Ok(Some(ExitSummary::from_code(code)))
            }
            Script::PollError => Err(anyhow!("scripted poll failure")),
            _ => Ok(None),
        }
    }

    fn terminate_tree(&mut self) -> Result<()> {
        self.inner.killed.lock().unwrap().push(self.job_id);
        self.mark_finished();
        match self.script {
            Script::KillFails => Err(anyhow!("scripted kill failure")),
            _ => Ok(()),
        }
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.mark_finished();
    }
}
