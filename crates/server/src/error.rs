//! Slot-level error taxonomy
//!
//! None of these are fatal to the portal. Start failures are recorded on the
//! affected slot as `last_error` (the `Display` text) and every other slot
//! keeps being served.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// Event carried neither `id_path` nor `devpath`
    #[error("missing id_path and devpath")]
    MissingSlotKey,

    /// Slot has no port assignment; tracked only
    #[error("slot {0} is not configured")]
    UnconfiguredSlot(String),

    /// Manual control named a slot that was never seen
    #[error("unknown slot_key {0}")]
    UnknownSlot(String),

    /// Start requested before any device node was recorded
    #[error("no device node recorded")]
    MissingDevnode,

    #[error("device not ready: {devnode}")]
    DeviceNotReady { devnode: String },

    #[error("spawn failed: {0}")]
    SpawnFailure(String),

    #[error("exited immediately ({status})")]
    PrematureExit { status: String },

    #[error("port not listening: {port}")]
    PortNeverListening { port: u16 },

    #[error("process died")]
    ProcessDeathDetected,
}
