//! Shared fixtures for integration tests
//!
//! Proxies are the real `serial-relay` binary launched through `/bin/sh`, so
//! every spawned pid is appended to a log file and can be checked for
//! liveness after the portal believes it is gone.

#![allow(dead_code)]

use common::test_utils::free_tcp_port;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use server::Portal;
use server::config::{PortalConfig, ProxySettings, SlotConfig, TimingSettings};
use server::host::HostIdentity;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub fn relay_bin() -> &'static str {
    env!("CARGO_BIN_EXE_serial-relay")
}

/// Short waits so failure scenarios finish quickly
pub fn fast_timing() -> TimingSettings {
    TimingSettings {
        device_ready_timeout_ms: 500,
        device_poll_interval_ms: 20,
        grace_period_ms: 200,
        port_poll_interval_ms: 50,
        port_poll_attempts: 60,
        connect_timeout_ms: 200,
        stop_timeout_ms: 2000,
    }
}

/// `sh -c <script>` as the proxy command
pub fn shell_proxy(script: String) -> ProxySettings {
    ProxySettings {
        executables: vec![PathBuf::from("/bin/sh")],
        args: vec!["-c".to_string(), script],
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub portal: Arc<Portal>,
    pub config: PortalConfig,
    pub pid_log: PathBuf,
}

impl Harness {
    /// Portal with one configured slot per `(key, label)` on free ports
    pub fn new(slots: &[(&str, &str)]) -> Self {
        Self::with_proxy(slots, |pid_log| {
            shell_proxy(format!(
                "echo $$ >> '{}'; exec '{}' --port {{port}} '{{devnode}}'",
                pid_log.display(),
                relay_bin()
            ))
        })
    }

    pub fn with_proxy(slots: &[(&str, &str)], proxy: impl FnOnce(&Path) -> ProxySettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pid_log = dir.path().join("pids.log");
        let config = PortalConfig {
            proxy: proxy(&pid_log),
            timing: fast_timing(),
            slots: slots
                .iter()
                .map(|(key, label)| SlotConfig {
                    slot_key: key.to_string(),
                    label: label.to_string(),
                    tcp_port: free_tcp_port(),
                })
                .collect(),
            ..PortalConfig::default()
        };
        let portal = Arc::new(Portal::new(&config, HostIdentity::localhost()));
        Self {
            dir,
            portal,
            config,
            pid_log,
        }
    }

    /// Create a stand-in device node that can be opened read/write
    pub fn device(&self, name: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn port(&self, key: &str) -> u16 {
        self.config
            .slots
            .iter()
            .find(|s| s.slot_key == key)
            .map(|s| s.tcp_port)
            .unwrap()
    }

    /// Every pid the proxy wrapper ever started
    pub fn spawned_pids(&self) -> Vec<i32> {
        std::fs::read_to_string(&self.pid_log)
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    pub fn live_pids(&self) -> Vec<i32> {
        self.spawned_pids()
            .into_iter()
            .filter(|pid| is_alive(*pid))
            .collect()
    }
}

pub fn is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}
