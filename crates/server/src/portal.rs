//! Portal facade
//!
//! Wires the registry, supervisor, hotplug handler and boot reconciler
//! together and exposes the operations served over the control channel.

use crate::boot::{BootReconciler, BootReport, DeviceEnumerator};
use crate::config::PortalConfig;
use crate::error::SlotError;
use crate::host::HostIdentity;
use crate::hotplug::{HotplugAck, HotplugEventHandler};
use crate::registry::SlotRegistry;
use crate::supervisor::ProcessSupervisor;
use anyhow::Result;
use protocol::{HotplugEvent, PortalInfo, SlotStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct Portal {
    registry: Arc<SlotRegistry>,
    supervisor: Arc<ProcessSupervisor>,
    hotplug: HotplugEventHandler,
}

impl Portal {
    pub fn new(config: &PortalConfig, host: HostIdentity) -> Self {
        let registry = Arc::new(SlotRegistry::load(&config.slots));
        let supervisor = Arc::new(ProcessSupervisor::new(
            config.proxy.clone(),
            config.timing.clone(),
            host,
            config.server.url_scheme.clone(),
        ));
        let hotplug = HotplugEventHandler::new(Arc::clone(&registry), Arc::clone(&supervisor));
        Self {
            registry,
            supervisor,
            hotplug,
        }
    }

    pub fn registry(&self) -> &Arc<SlotRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn host(&self) -> &HostIdentity {
        self.supervisor.host()
    }

    /// Bring already-attached devices up; call before accepting events
    pub async fn reconcile_boot<E: DeviceEnumerator>(&self, enumerator: &E) -> Result<BootReport> {
        BootReconciler::new(Arc::clone(&self.registry), Arc::clone(&self.supervisor))
            .run(enumerator)
            .await
    }

    pub async fn handle_hotplug(&self, event: HotplugEvent) -> Result<HotplugAck, SlotError> {
        self.hotplug.handle(event).await
    }

    /// Synchronously (re)start a configured slot's proxy on `devnode`
    ///
    /// Returns whether the proxy is running afterwards.
    pub async fn manual_start(&self, slot_key: &str, devnode: &str) -> Result<bool, SlotError> {
        let slot = self
            .registry
            .get(slot_key)
            .ok_or_else(|| SlotError::UnknownSlot(slot_key.to_string()))?;
        if !slot.is_configured() {
            return Err(SlotError::UnconfiguredSlot(slot_key.to_string()));
        }

        let mut proxy = slot.lock().await;
        slot.supersede();
        self.supervisor.stop(&slot, &mut proxy).await;
        slot.mark_present(devnode);
        info!(slot = slot_key, devnode, "Manual start");
        self.supervisor.start(&slot, &mut proxy).await?;
        Ok(slot.state().running)
    }

    /// Synchronously stop a slot's proxy; succeeds on already stopped slots
    pub async fn manual_stop(&self, slot_key: &str) -> Result<(), SlotError> {
        let slot = self
            .registry
            .get(slot_key)
            .ok_or_else(|| SlotError::UnknownSlot(slot_key.to_string()))?;

        let mut proxy = slot.lock().await;
        slot.supersede();
        info!(slot = slot_key, "Manual stop");
        self.supervisor.stop(&slot, &mut proxy).await;
        Ok(())
    }

    /// Check recorded proxies for unexpected exits; returns how many died
    pub fn refresh_health(&self) -> usize {
        self.registry
            .slots()
            .iter()
            .filter(|slot| self.supervisor.refresh_health(slot))
            .count()
    }

    /// Every slot's state after a health refresh
    pub fn status(&self) -> Vec<SlotStatus> {
        self.refresh_health();
        self.registry.snapshot_all()
    }

    pub fn info(&self) -> PortalInfo {
        self.refresh_health();
        let (slots_configured, slots_running) = self.registry.counts();
        let host = self.host();
        PortalInfo {
            host_ip: host.ip.clone(),
            hostname: host.hostname.clone(),
            slots_configured,
            slots_running,
        }
    }

    /// Periodic health checks, for deployments where nobody polls status
    pub fn spawn_health_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let portal = Arc::clone(self);
        info!("Health sweep every {}s", interval.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let died = portal.refresh_health();
                if died > 0 {
                    debug!("Health sweep found {} dead proxy(ies)", died);
                }
            }
        })
    }

    /// Finish in-flight starts, then stop every proxy
    pub async fn shutdown(&self) {
        self.supervisor.drain().await;
        for slot in self.registry.slots() {
            let mut proxy = slot.lock().await;
            if proxy.is_some() {
                self.supervisor.stop(&slot, &mut proxy).await;
            }
        }
        info!("All proxies stopped");
    }
}
