//! Proxy process handle
//!
//! Wraps a spawned proxy so the supervisor only ever sees liveness, a
//! termination request and a bounded exit wait. The handle keeps the child
//! un-reaped until its exit is observed, so the recorded pid cannot be reused
//! by an unrelated process while the handle exists.
//!
//! Platform-specific pieces (session detachment, graceful signal) live in the
//! per-platform submodules.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(not(unix))]
mod other;
#[cfg(not(unix))]
use other as platform;

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How to ask a process to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM on Unix; lets the proxy release the device
    Graceful,
    /// SIGKILL on Unix
    Forced,
}

/// A spawned proxy process
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Spawn `program` detached in its own session
    ///
    /// Standard streams are discarded and the child is not killed when the
    /// handle is dropped, so a supervisor exit does not take proxies down.
    pub fn spawn(program: &Path, args: &[String]) -> io::Result<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        platform::detach(&mut command);

        let child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("process exited before its pid was read"))?;
        debug!(pid, program = %program.display(), "Spawned process");
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the process has already exited
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!(pid = self.pid, "Failed to poll process: {}", e);
                None
            }
        }
    }

    pub fn is_alive(&mut self) -> bool {
        self.exit_status().is_none()
    }

    /// Deliver a termination request without waiting
    pub fn terminate(&mut self, mode: Termination) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        match mode {
            Termination::Graceful => platform::signal_graceful(self.pid),
            Termination::Forced => self.child.start_kill(),
        }
    }

    /// Wait up to `timeout` for exit; returns whether the process exited
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(pid = self.pid, "Failed to wait for process: {}", e);
                !self.is_alive()
            }
            Err(_) => false,
        }
    }

    /// Graceful termination, escalating to a forced kill after `timeout`
    ///
    /// Returns whether a live process was found.
    pub async fn shutdown(&mut self, timeout: Duration) -> bool {
        if !self.is_alive() {
            return false;
        }

        if let Err(e) = self.terminate(Termination::Graceful) {
            debug!(pid = self.pid, "Graceful termination unavailable: {}", e);
        } else if self.wait(timeout).await {
            return true;
        }

        warn!(pid = self.pid, "Process ignored termination request, killing");
        if let Err(e) = self.terminate(Termination::Forced) {
            warn!(pid = self.pid, "Failed to kill process: {}", e);
        }
        if !self.wait(timeout).await {
            warn!(pid = self.pid, "Process still not reaped after kill");
        }
        true
    }
}
