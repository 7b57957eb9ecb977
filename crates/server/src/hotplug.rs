//! Hotplug event ingestion
//!
//! Translates add/remove notifications into slot transitions:
//! - `add` records presence and, for configured slots, queues a restart of the
//!   proxy on a background task; the caller is answered immediately
//! - `remove` records absence and stops the proxy before returning, so a
//!   following `add` for the same slot can never race a stop in flight
//!
//! Events for different slots run fully in parallel. Events for one slot are
//! serialized by that slot's lifecycle lock, and a queued start that has been
//! overtaken by a newer event for its slot is dropped. Duplicate deliveries
//! are therefore harmless.

use crate::error::SlotError;
use crate::registry::SlotRegistry;
use crate::supervisor::ProcessSupervisor;
use protocol::{HotplugAction, HotplugEvent};
use std::sync::Arc;
use tracing::info;

/// Acknowledgement returned to the event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugAck {
    pub slot_key: String,
    pub seq: u64,
    /// Slot is configured, so a proxy is managed for it
    pub accepted: bool,
}

pub struct HotplugEventHandler {
    registry: Arc<SlotRegistry>,
    supervisor: Arc<ProcessSupervisor>,
}

impl HotplugEventHandler {
    pub fn new(registry: Arc<SlotRegistry>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            registry,
            supervisor,
        }
    }

    /// Apply one event
    ///
    /// Fails only with [`SlotError::MissingSlotKey`], in which case no state
    /// was touched.
    pub async fn handle(&self, event: HotplugEvent) -> Result<HotplugAck, SlotError> {
        let slot_key = event.slot_key().ok_or(SlotError::MissingSlotKey)?.to_string();
        let slot = self.registry.get_or_create(&slot_key);
        let seq = self.registry.next_seq();
        let generation = slot.record_event(event.action, seq, event.devnode.clone());
        let configured = slot.is_configured();

        info!(
            action = %event.action,
            slot = %slot_key,
            devnode = event.devnode.as_deref().unwrap_or("-"),
            seq,
            "Hotplug event"
        );

        match event.action {
            HotplugAction::Add if configured => {
                self.supervisor.dispatch_restart(Arc::clone(&slot), generation);
            }
            HotplugAction::Add => {
                info!(slot = %slot_key, "Unconfigured slot (tracked, no proxy)");
            }
            HotplugAction::Remove if configured => {
                // Waits for an in-flight start to finish, then undoes it
                let mut proxy = slot.lock().await;
                if proxy.is_some() || slot.state().running {
                    self.supervisor.stop(&slot, &mut proxy).await;
                }
            }
            HotplugAction::Remove => {}
        }

        Ok(HotplugAck {
            slot_key,
            seq,
            accepted: configured,
        })
    }
}
