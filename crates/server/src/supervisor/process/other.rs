//! Fallback process control for platforms without POSIX signals
//!
//! There is no graceful termination request; callers escalate straight to a
//! forced kill.

use std::io;
use tokio::process::Command;

pub(super) fn detach(_command: &mut Command) {}

pub(super) fn signal_graceful(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination not supported on this platform",
    ))
}
