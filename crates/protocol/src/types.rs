//! Hotplug and slot status type definitions
//!
//! These are the payload types carried by [`crate::Request`] and
//! [`crate::Response`]. Field names match the JSON emitted by the udev
//! adapter and consumed by dashboards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of hotplug transition reported by the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotplugAction {
    /// Device attached
    Add,
    /// Device detached
    Remove,
}

impl HotplugAction {
    /// Lowercase wire name (`"add"` / `"remove"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            HotplugAction::Add => "add",
            HotplugAction::Remove => "remove",
        }
    }
}

impl fmt::Display for HotplugAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single attach/detach notification
///
/// `id_path` and `devpath` are identity hints; the slot key is `id_path`
/// when non-empty and `devpath` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    /// OS-assigned device node (e.g. `/dev/ttyACM0`)
    #[serde(default)]
    pub devnode: Option<String>,
    /// Stable physical path from udev `ID_PATH`
    #[serde(default)]
    pub id_path: String,
    /// Kernel device path from udev `DEVPATH`
    #[serde(default)]
    pub devpath: String,
}

impl HotplugEvent {
    /// Resolve the slot key from the identity hints
    ///
    /// Returns `None` when both hints are empty.
    pub fn slot_key(&self) -> Option<&str> {
        resolve_slot_key(&self.id_path, &self.devpath)
    }
}

/// Identity scheme shared by hotplug events and boot enumeration
pub fn resolve_slot_key<'a>(id_path: &'a str, devpath: &'a str) -> Option<&'a str> {
    if !id_path.is_empty() {
        Some(id_path)
    } else if !devpath.is_empty() {
        Some(devpath)
    } else {
        None
    }
}

/// Observable state of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    /// Human name (configured slots only)
    pub label: Option<String>,
    pub slot_key: String,
    /// Proxy listen port (configured slots only)
    pub tcp_port: Option<u16>,
    /// Device currently attached
    pub present: bool,
    /// Proxy confirmed live and listening
    pub running: bool,
    pub pid: Option<u32>,
    pub devnode: Option<String>,
    /// Registry-wide sequence number of the last event seen by this slot
    pub seq: u64,
    pub last_action: Option<HotplugAction>,
    /// RFC3339 timestamp of the last event
    pub last_event_time: Option<String>,
    pub url: Option<String>,
    pub last_error: Option<String>,
}

impl SlotStatus {
    /// Configured slots carry a port; dynamic ones never do
    pub fn is_configured(&self) -> bool {
        self.tcp_port.is_some()
    }

    /// Short state name used by the CLI (`RUNNING`, `PRESENT`, `EMPTY`)
    pub fn state_label(&self) -> &'static str {
        if self.running {
            "RUNNING"
        } else if self.present {
            "PRESENT"
        } else {
            "EMPTY"
        }
    }
}

/// Host-level summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalInfo {
    pub host_ip: String,
    pub hostname: String,
    pub slots_configured: usize,
    pub slots_running: usize,
}
