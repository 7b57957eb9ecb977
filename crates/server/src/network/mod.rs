//! Control channel
//!
//! Line-delimited JSON over TCP carrying hotplug events, status queries and
//! manual controls.
//!
//! # Architecture
//!
//! ```text
//! ControlServer
//!   ├─> accept connections
//!   └─> spawn a task per connection
//!         ├─> read one Request per line
//!         ├─> dispatch to Portal
//!         └─> write one Response per line
//! ```

pub mod client;
pub mod server;

pub use client::ControlClient;
pub use server::{ControlServer, dispatch};
