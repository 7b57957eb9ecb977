//! Readiness polling
//!
//! Boolean probes used by the supervisor before and after spawning a proxy.
//! A negative result is not an error; the caller decides what it means.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Polling utilities with fixed intervals
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    pub device_poll_interval: Duration,
    pub port_poll_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            device_poll_interval: Duration::from_millis(100),
            port_poll_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl ReadinessProbe {
    /// Poll until `path` exists and can be opened read/write
    pub async fn wait_device_ready(&self, path: &Path, timeout: Duration) -> bool {
        poll_until(timeout, self.device_poll_interval, || is_device_openable(path)).await
    }

    /// Poll until something accepts TCP connections on local `port`
    pub async fn wait_port_listening(&self, port: u16, timeout: Duration) -> bool {
        let connect_timeout = self.connect_timeout;
        poll_until(timeout, self.port_poll_interval, || {
            is_port_listening(port, connect_timeout)
        })
        .await
    }
}

/// Run `check` until it succeeds or `timeout` elapses; at least one attempt
async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() + interval > deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Single attempt to open a device node read/write without blocking
pub async fn is_device_openable(path: &Path) -> bool {
    let mut options = tokio::fs::OpenOptions::new();
    options.read(true).write(true);
    #[cfg(unix)]
    options.custom_flags(nix::fcntl::OFlag::O_NONBLOCK.bits());
    options.open(path).await.is_ok()
}

/// Single TCP connect attempt to `127.0.0.1:port`
pub async fn is_port_listening(port: u16, connect_timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    matches!(
        tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
