//! Startup reconciliation
//!
//! Hotplug notifications only fire on transitions, so devices that were
//! already attached when the portal launched would never be seen. The boot
//! reconciler enumerates them once, before the event source is attached,
//! and starts proxies for every configured slot whose device is present.

use crate::config::BootSettings;
use crate::registry::SlotRegistry;
use crate::supervisor::ProcessSupervisor;
use anyhow::{Context, Result, bail};
use protocol::types::resolve_slot_key;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A device node found attached at startup with its identity hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub devnode: String,
    pub id_path: String,
    pub devpath: String,
}

impl DiscoveredDevice {
    /// Same identity scheme as hotplug events
    pub fn slot_key(&self) -> Option<&str> {
        resolve_slot_key(&self.id_path, &self.devpath)
    }
}

/// Source of currently attached devices
pub trait DeviceEnumerator {
    fn enumerate(&self) -> impl Future<Output = Result<Vec<DiscoveredDevice>>> + Send;
}

/// Scans `/dev` for serial nodes and asks udev for their identity
#[derive(Debug, Clone)]
pub struct UdevEnumerator {
    dev_dir: PathBuf,
    prefixes: Vec<String>,
    udevadm: PathBuf,
    query_timeout: Duration,
}

impl UdevEnumerator {
    pub fn new(settings: &BootSettings) -> Self {
        Self {
            dev_dir: settings.dev_dir.clone(),
            prefixes: settings.device_prefixes.clone(),
            udevadm: settings.udevadm.clone(),
            query_timeout: settings.query_timeout(),
        }
    }

    async fn device_nodes(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dev_dir)
            .await
            .with_context(|| format!("Failed to read {}", self.dev_dir.display()))?;

        let mut nodes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                nodes.push(entry.path());
            }
        }
        nodes.sort();
        Ok(nodes)
    }

    async fn query(&self, devnode: &str) -> Result<DiscoveredDevice> {
        let output = tokio::time::timeout(
            self.query_timeout,
            Command::new(&self.udevadm)
                .args(["info", "-q", "property", "-n", devnode])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("udevadm timed out")?
        .context("Failed to run udevadm")?;

        if !output.status.success() {
            bail!("udevadm exited with {}", output.status);
        }

        let props = parse_udev_properties(&String::from_utf8_lossy(&output.stdout));
        Ok(DiscoveredDevice {
            devnode: devnode.to_string(),
            id_path: props.get("ID_PATH").cloned().unwrap_or_default(),
            devpath: props.get("DEVPATH").cloned().unwrap_or_default(),
        })
    }
}

impl DeviceEnumerator for UdevEnumerator {
    async fn enumerate(&self) -> Result<Vec<DiscoveredDevice>> {
        let mut devices = Vec::new();
        for node in self.device_nodes().await? {
            let devnode = node.to_string_lossy().into_owned();
            match self.query(&devnode).await {
                Ok(device) => devices.push(device),
                Err(e) => warn!(%devnode, "Boot scan: skipping device: {:#}", e),
            }
        }
        Ok(devices)
    }
}

/// Parse `KEY=value` lines from `udevadm info -q property`
pub fn parse_udev_properties(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Outcome of a boot scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    pub discovered: usize,
    pub started: usize,
    pub failed: usize,
    /// Devices with no identity or on unconfigured slots
    pub untracked: usize,
}

pub struct BootReconciler {
    registry: Arc<SlotRegistry>,
    supervisor: Arc<ProcessSupervisor>,
}

impl BootReconciler {
    pub fn new(registry: Arc<SlotRegistry>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            registry,
            supervisor,
        }
    }

    /// Mark attached devices present and start their configured slots
    ///
    /// Slots start concurrently; the call returns once every start finished.
    pub async fn run<E: DeviceEnumerator>(&self, enumerator: &E) -> Result<BootReport> {
        let devices = enumerator.enumerate().await?;
        let mut report = BootReport {
            discovered: devices.len(),
            ..BootReport::default()
        };

        if devices.is_empty() {
            info!("Boot scan: no devices found");
            return Ok(report);
        }
        info!("Boot scan: found {} device(s)", devices.len());

        let mut starts = JoinSet::new();
        for device in devices {
            let Some(key) = device.slot_key() else {
                warn!(devnode = %device.devnode, "Boot scan: no slot key, skipping");
                report.untracked += 1;
                continue;
            };

            let slot = self.registry.get_or_create(key);
            slot.mark_present(&device.devnode);

            if !slot.is_configured() {
                info!(slot = key, "Boot scan: unconfigured slot (tracked, no proxy)");
                report.untracked += 1;
                continue;
            }
            if slot.state().running {
                continue;
            }

            debug!(slot = key, devnode = %device.devnode, "Boot scan: starting proxy");
            let supervisor = Arc::clone(&self.supervisor);
            starts.spawn(async move {
                let mut proxy = slot.lock().await;
                if slot.state().running {
                    return true;
                }
                supervisor.start(&slot, &mut proxy).await.is_ok()
            });
        }

        while let Some(result) = starts.join_next().await {
            match result {
                Ok(true) => report.started += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("Boot scan: start task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            started = report.started,
            failed = report.failed,
            "Boot scan complete"
        );
        Ok(report)
    }
}
