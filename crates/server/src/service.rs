//! Systemd service integration
//!
//! Speaks the sd-notify datagram protocol so the portal can run as a
//! `Type=notify` unit with an optional watchdog. Every call is a no-op when
//! `NOTIFY_SOCKET` is unset.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[cfg(unix)]
fn notify(state: &str) -> Result<bool> {
    use std::os::unix::net::UnixDatagram;

    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        return Ok(false);
    };
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(state.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send {} to systemd", state))?;
    Ok(true)
}

#[cfg(not(unix))]
fn notify(_state: &str) -> Result<bool> {
    Ok(false)
}

/// Tell systemd the portal finished boot reconciliation and is serving
pub fn notify_ready() -> Result<()> {
    if notify("READY=1")? {
        info!("Notified systemd: service ready");
    } else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
    }
    Ok(())
}

pub fn notify_stopping() -> Result<()> {
    if notify("STOPPING=1")? {
        info!("Notified systemd: service stopping");
    }
    Ok(())
}

pub fn notify_watchdog() -> Result<()> {
    notify("WATCHDOG=1").map(|_| ())
}

/// Free-form status line shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    if notify(&format!("STATUS={}", status))? {
        debug!("Notified systemd: status = {}", status);
    }
    Ok(())
}

/// Keepalive period: half of `WATCHDOG_USEC`, at least one second
pub fn watchdog_interval() -> Option<Duration> {
    let usec: u64 = env::var("WATCHDOG_USEC").ok()?.parse().ok()?;
    Some(Duration::from_micros(usec / 2).max(Duration::from_secs(1)))
}

pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Send watchdog keepalives in the background, if systemd asked for them
pub fn spawn_watchdog_task() -> Option<JoinHandle<()>> {
    let Some(interval) = watchdog_interval() else {
        debug!("Systemd watchdog not enabled");
        return None;
    };
    info!("Systemd watchdog enabled, interval: {}s", interval.as_secs());

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = notify_watchdog() {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}
