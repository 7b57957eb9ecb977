//! Unix process control via session detachment and signals

use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, setsid};
use std::io;
use tokio::process::Command;

/// Run the child in a new session so terminal and supervisor signals do
/// not propagate to it
pub(super) fn detach(command: &mut Command) {
    // SAFETY: setsid is async-signal-safe and touches no parent state
    unsafe {
        command.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
    }
}

pub(super) fn signal_graceful(pid: u32) -> io::Result<()> {
    let raw = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(io::Error::from)
}
