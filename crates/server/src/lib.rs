//! serial-portal server
//!
//! Exposes USB serial devices over TCP by running one proxy process per
//! configured physical attachment point ("slot"). Proxies follow the devices
//! as they are plugged and unplugged, driven by hotplug events delivered on
//! the control channel.

pub mod boot;
pub mod config;
pub mod error;
pub mod host;
pub mod hotplug;
pub mod network;
pub mod portal;
pub mod registry;
pub mod service;
pub mod supervisor;

pub use error::SlotError;
pub use portal::Portal;
