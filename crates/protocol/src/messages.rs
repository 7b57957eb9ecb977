//! Control message definitions
//!
//! Requests are tagged by `method`, responses by `result`:
//! - Hotplug ingestion (`hotplug`)
//! - Status reporting (`status`, `info`)
//! - Manual controls (`start`, `stop`)

use crate::types::{HotplugEvent, PortalInfo, SlotStatus};
use serde::{Deserialize, Serialize};

/// Requests accepted by the portal control server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Request {
    /// Device attach/detach notification
    Hotplug { event: HotplugEvent },

    /// Per-slot status (refreshes proxy health first)
    Status,

    /// Host summary
    Info,

    /// Start the proxy for a configured slot on the given device node
    Start { slot_key: String, devnode: String },

    /// Stop the proxy for a slot
    Stop { slot_key: String },
}

/// Responses sent by the portal control server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Response {
    /// Hotplug event accepted
    Hotplug {
        slot_key: String,
        seq: u64,
        /// Whether the slot is configured (a proxy will be managed)
        accepted: bool,
    },

    /// Snapshot of every slot
    Status {
        slots: Vec<SlotStatus>,
        host_ip: String,
        hostname: String,
    },

    /// Host summary
    Info(PortalInfo),

    /// Outcome of a manual start/stop
    Control {
        ok: bool,
        slot_key: String,
        running: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Request rejected; no slot state was changed
    Error { error: String },
}

impl Response {
    /// Build an error response
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    /// Whether this response reports success
    pub fn is_ok(&self) -> bool {
        match self {
            Response::Error { .. } => false,
            Response::Control { ok, .. } => *ok,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HotplugAction;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_str(
            r#"{"method":"hotplug","event":{"action":"add","devnode":"/dev/ttyUSB0","id_path":"p","devpath":""}}"#,
        )
        .unwrap();
        match req {
            Request::Hotplug { event } => {
                assert_eq!(event.action, HotplugAction::Add);
                assert_eq!(event.devnode.as_deref(), Some("/dev/ttyUSB0"));
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let req: Request = serde_json::from_str(r#"{"method":"stop","slot_key":"k"}"#).unwrap();
        assert_eq!(
            req,
            Request::Stop {
                slot_key: "k".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"method":"reboot"}"#).is_err());
    }

    #[test]
    fn test_info_response_is_flat() {
        let resp = Response::Info(PortalInfo {
            host_ip: "10.0.0.2".to_string(),
            hostname: "pi".to_string(),
            slots_configured: 2,
            slots_running: 1,
        });
        let value: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["result"], "info");
        assert_eq!(value["slots_running"], 1);
    }

    #[test]
    fn test_is_ok() {
        assert!(!Response::error("bad").is_ok());
        assert!(
            !Response::Control {
                ok: false,
                slot_key: "k".to_string(),
                running: false,
                error: Some("device not ready".to_string()),
            }
            .is_ok()
        );
        assert!(
            Response::Hotplug {
                slot_key: "k".to_string(),
                seq: 1,
                accepted: false,
            }
            .is_ok()
        );
    }
}
