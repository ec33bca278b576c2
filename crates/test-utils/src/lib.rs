pub mod builders;
pub mod fake_controller;

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use orcaq::JobEngine;
use orcaq::engine::EngineConfig;
use orcaq::exec::FixedProbe;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{EngineConfigBuilder, JobSpecBuilder};
pub use fake_controller::{Script, ScriptedController};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Engine wired to `controller` and its in-memory filesystem, with a probe
/// that always reports a parallel runtime.
pub fn scripted_engine(controller: &ScriptedController, config: EngineConfig) -> JobEngine {
    JobEngine::with_parts(
        config,
        Arc::new(controller.clone()),
        Arc::new(FixedProbe(true)),
        Arc::new(controller.fs()),
    )
    .expect("engine should start")
}

/// Poll `cond` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
