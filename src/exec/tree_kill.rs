// src/exec/tree_kill.rs

//! Platform-specific process-tree handling.
//!
//! The compute program usually launches helpers of its own, so killing just
//! the direct child is not enough.
//!
//! - Unix: the child is made leader of a fresh process group at spawn time,
//!   and termination sends `SIGKILL` to the whole group.
//! - Windows: the child gets its own process group and no console window;
//!   termination runs `taskkill /T /F /PID <pid>`, falling back to
//!   `Child::kill` if that fails.

use std::io;
use std::process::{Child, Command};

use anyhow::Result;
use tracing::{debug, warn};

/// Prepare `cmd` so that [`kill_tree`] can later reach every descendant.
#[cfg(unix)]
pub fn configure_process_tree(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
pub fn configure_process_tree(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
pub fn configure_process_tree(_cmd: &mut Command) {}

/// Kill `child` and all of its descendants.
///
/// `child` is reaped only when the kill went through; after a failed kill
/// it is polled once, so the caller never blocks on a process that may
/// still be running.
#[cfg(unix)]
pub fn kill_tree(child: &mut Child) -> Result<()> {
    use anyhow::anyhow;
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    let signalled = match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pgid = pgid.as_raw(), "process group already gone");
            Ok(())
        }
        Err(errno) => match child.kill() {
            // The leader is going down, but its descendants may not be.
            Ok(()) => {
                reap(child);
                return Err(anyhow!(
                    "killpg({}) failed: {errno}; only the direct child was killed",
                    pgid.as_raw()
                ));
            }
            Err(kill_err) => Err(anyhow!(
                "killpg({}) failed: {errno}; kill failed: {kill_err}",
                pgid.as_raw()
            )),
        },
    };

    settle(child, signalled)
}

#[cfg(windows)]
pub fn kill_tree(child: &mut Child) -> Result<()> {
    use anyhow::{Context, anyhow};
    use std::process::Stdio;

    let pid = child.id().to_string();
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", pid.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    let signalled = match status {
        Ok(s) if s.success() => Ok(()),
        Ok(s) => {
            debug!(pid = %pid, status = %s, "taskkill failed; falling back to Child::kill");
            child.kill().with_context(|| format!("killing process {pid} after taskkill exited with {s}"))
        }
        Err(e) => {
            debug!(pid = %pid, error = %e, "could not run taskkill; falling back to Child::kill");
            child
                .kill()
                .map_err(|kill_err| anyhow!("taskkill unavailable ({e}) and kill failed: {kill_err}"))
        }
    };

    settle(child, signalled)
}

#[cfg(not(any(unix, windows)))]
pub fn kill_tree(child: &mut Child) -> Result<()> {
    use anyhow::Context;
    let signalled = child.kill().context("killing child process");
    settle(child, signalled)
}

/// What [`settle`] needs from a killed process.
trait Reap {
    fn pid(&self) -> u32;
    /// Block until the process has exited.
    fn wait_exit(&mut self) -> io::Result<()>;
    /// Non-blocking check; `true` once the process has exited.
    fn poll_exit(&mut self) -> io::Result<bool>;
}

impl Reap for Child {
    fn pid(&self) -> u32 {
        self.id()
    }

    fn wait_exit(&mut self) -> io::Result<()> {
        self.wait().map(|_| ())
    }

    fn poll_exit(&mut self) -> io::Result<bool> {
        self.try_wait().map(|status| status.is_some())
    }
}

/// Reap after a successful kill; after a failed one, poll once and hand the
/// error back.
fn settle(process: &mut impl Reap, signalled: Result<()>) -> Result<()> {
    match signalled {
        Ok(()) => {
            reap(process);
            Ok(())
        }
        Err(err) => {
            match process.poll_exit() {
                Ok(true) => debug!(pid = process.pid(), "process exited although the kill failed"),
                Ok(false) => warn!(pid = process.pid(), "process still running after failed kill"),
                Err(e) => warn!(pid = process.pid(), error = %e, "could not poll process after failed kill"),
            }
            Err(err)
        }
    }
}

fn reap(process: &mut impl Reap) {
    if let Err(e) = process.wait_exit() {
        warn!(pid = process.pid(), error = %e, "failed to reap terminated process");
    }
}


#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::{Duration, Instant};

    /// Alive means present in /proc and not a zombie.
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

    fn wait_for_file(path: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(s) = std::fs::read_to_string(path) {
                if !s.trim().is_empty() {
                    return s;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("{} never appeared", path.display());
    }

    #[test]
    fn kill_tree_takes_down_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg("sleep 60 & echo $! > \"$1\"; wait")
            .arg("sh")
            .arg(&pid_file);
        configure_process_tree(&mut cmd);
        let mut child = cmd.spawn().unwrap();

        let grandchild: u32 = wait_for_file(&pid_file).trim().parse().unwrap();
        assert!(process_alive(grandchild));

        kill_tree(&mut child).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while process_alive(grandchild) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!process_alive(grandchild), "grandchild {grandchild} survived");
        assert!(!process_alive(child.id()));
    }

    #[test]
    fn kill_tree_on_exited_process_is_ok() {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg("exit 0");
        configure_process_tree(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        child.wait().unwrap();

        kill_tree(&mut child).unwrap();
    }
}
