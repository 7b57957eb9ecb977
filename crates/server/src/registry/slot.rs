//! Per-slot state record
//!
//! A slot carries two locks, both private to the slot:
//! - the lifecycle lock (async) owns the running proxy process and is held for
//!   the whole of a start or stop, serializing all lifecycle work on the slot
//! - the state lock (sync) guards the observable fields and is only held for
//!   short field updates, never across an await
//!
//! Callers never hold locks of two different slots at once.

use crate::supervisor::ProcessHandle;
use chrono::{DateTime, SecondsFormat, Utc};
use protocol::{HotplugAction, SlotStatus};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Proof that the slot's lifecycle lock is held; derefs to the proxy handle
pub type SlotGuard<'a> = tokio::sync::MutexGuard<'a, Option<ProcessHandle>>;

/// Observable fields of a slot
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    pub present: bool,
    pub running: bool,
    pub pid: Option<u32>,
    pub devnode: Option<String>,
    pub seq: u64,
    pub last_action: Option<HotplugAction>,
    pub last_event_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub last_error: Option<String>,
    /// Bumped by every event or manual control; a queued start whose
    /// generation is no longer current has been superseded.
    generation: u64,
}

/// One physical attachment point
#[derive(Debug)]
pub struct Slot {
    key: String,
    label: Option<String>,
    tcp_port: Option<u16>,
    state: Mutex<SlotState>,
    proxy: tokio::sync::Mutex<Option<ProcessHandle>>,
}

impl Slot {
    /// Slot seeded from configuration
    pub fn configured(key: impl Into<String>, label: impl Into<String>, tcp_port: u16) -> Self {
        Self::new(key.into(), Some(label.into()), Some(tcp_port))
    }

    /// Slot discovered through an event with no matching configuration
    pub fn dynamic(key: impl Into<String>) -> Self {
        Self::new(key.into(), None, None)
    }

    fn new(key: String, label: Option<String>, tcp_port: Option<u16>) -> Self {
        Self {
            key,
            label,
            tcp_port,
            state: Mutex::new(SlotState::default()),
            proxy: tokio::sync::Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn tcp_port(&self) -> Option<u16> {
        self.tcp_port
    }

    /// Dynamic slots are tracked but never started
    pub fn is_configured(&self) -> bool {
        self.tcp_port.is_some()
    }

    /// Short-lived access to the observable fields
    pub fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the lifecycle lock, waiting for any in-flight start or stop
    pub async fn lock(&self) -> SlotGuard<'_> {
        self.proxy.lock().await
    }

    /// Acquire the lifecycle lock only if no operation is in flight
    pub fn try_lock(&self) -> Option<SlotGuard<'_>> {
        self.proxy.try_lock().ok()
    }

    /// Apply an accepted hotplug event and return its generation
    pub fn record_event(&self, action: HotplugAction, seq: u64, devnode: Option<String>) -> u64 {
        let mut state = self.state();
        state.seq = seq;
        state.last_action = Some(action);
        state.last_event_time = Some(Utc::now());
        match action {
            HotplugAction::Add => {
                state.present = true;
                state.devnode = devnode;
            }
            HotplugAction::Remove => {
                state.present = false;
                state.devnode = None;
            }
        }
        state.generation += 1;
        state.generation
    }

    /// Invalidate queued starts (used by manual controls)
    pub fn supersede(&self) -> u64 {
        let mut state = self.state();
        state.generation += 1;
        state.generation
    }

    /// Whether no event or control has arrived since `generation` was issued
    pub fn is_current(&self, generation: u64) -> bool {
        self.state().generation == generation
    }

    /// Record a device found attached at startup
    pub fn mark_present(&self, devnode: &str) {
        let mut state = self.state();
        state.present = true;
        state.devnode = Some(devnode.to_string());
    }

    /// Immutable copy of the observable fields
    pub fn snapshot(&self) -> SlotStatus {
        let state = self.state();
        SlotStatus {
            label: self.label.clone(),
            slot_key: self.key.clone(),
            tcp_port: self.tcp_port,
            present: state.present,
            running: state.running,
            pid: state.pid,
            devnode: state.devnode.clone(),
            seq: state.seq,
            last_action: state.last_action,
            last_event_time: state
                .last_event_time
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            url: state.url.clone(),
            last_error: state.last_error.clone(),
        }
    }
}
