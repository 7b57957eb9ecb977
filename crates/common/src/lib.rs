//! Common utilities for serial-portal
//!
//! This crate provides functionality shared by the portal daemon, its CLI and
//! the relay binary: error types, logging setup and test helpers.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
