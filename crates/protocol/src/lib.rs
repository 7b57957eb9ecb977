//! Control protocol for serial-portal
//!
//! This crate defines the messages exchanged between the portal daemon and its
//! callers: hotplug notifications from the udev adapter, status queries and
//! manual start/stop controls. Messages are JSON objects framed one per line.
//!
//! # Example
//!
//! ```
//! use protocol::{HotplugAction, HotplugEvent, Request, decode_line, encode_line};
//!
//! let request = Request::Hotplug {
//!     event: HotplugEvent {
//!         action: HotplugAction::Add,
//!         devnode: Some("/dev/ttyACM0".to_string()),
//!         id_path: "platform-xhci-hcd.0-usb-0:1:1.0".to_string(),
//!         devpath: String::new(),
//!     },
//! };
//!
//! let line = encode_line(&request).unwrap();
//! assert!(line.ends_with(b"\n"));
//!
//! let decoded: Request = decode_line(&line).unwrap();
//! assert_eq!(decoded, request);
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{
    MAX_LINE_LEN, MAX_RESPONSE_LEN, decode_line, encode_line, read_line, read_line_limited,
    write_line,
};

#[cfg(feature = "async")]
pub use codec::{read_line_async, read_line_async_limited, write_line_async};
pub use error::{ProtocolError, Result};
pub use messages::{Request, Response};
pub use types::{HotplugAction, HotplugEvent, PortalInfo, SlotStatus};
