//! Integration tests for configuration files
//!
//! Covers loading from disk, partial files falling back to defaults, and
//! rejection of inconsistent slot tables.

use server::config::PortalConfig;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[server]
bind_addr = "0.0.0.0:9090"
service_mode = true
log_level = "debug"
advertise_host = "portal.lan"
url_scheme = "rfc2217"

[proxy]
executables = ["~/bin/serial-relay", "/usr/local/bin/serial-relay"]
args = ["--port", "{port}", "{devnode}"]

[timing]
device_ready_timeout_ms = 3000
grace_period_ms = 250
port_poll_attempts = 10

[health]
sweep_interval_secs = 30

[boot]
enabled = false
device_prefixes = ["ttyACM"]

[[slots]]
slot_key = "platform-3f980000.usb-usb-0:1.2:1.0"
label = "SLOT1"
tcp_port = 4001

[[slots]]
slot_key = "platform-3f980000.usb-usb-0:1.3:1.0"
label = "SLOT2"
tcp_port = 4002
"#;

#[test]
fn test_parse_full_config() {
    let config = PortalConfig::parse(FULL_CONFIG).unwrap();

    assert_eq!(config.server.bind_addr, "0.0.0.0:9090");
    assert!(config.server.service_mode);
    assert_eq!(config.server.advertise_host.as_deref(), Some("portal.lan"));
    assert_eq!(config.proxy.executables.len(), 2);

    assert_eq!(config.timing.device_ready_timeout(), Duration::from_secs(3));
    assert_eq!(config.timing.grace_period(), Duration::from_millis(250));
    // Unset timing keys keep their defaults
    assert_eq!(config.timing.port_poll_interval(), Duration::from_millis(100));
    assert_eq!(config.timing.port_ready_budget(), Duration::from_secs(1));

    assert_eq!(config.health.sweep_interval(), Some(Duration::from_secs(30)));
    assert!(!config.boot.enabled);
    assert_eq!(config.boot.device_prefixes, vec!["ttyACM".to_string()]);
    assert_eq!(config.boot.dev_dir, PathBuf::from("/dev"));

    assert_eq!(config.slots.len(), 2);
    assert_eq!(config.slots[1].label, "SLOT2");
    assert_eq!(config.slots[1].tcp_port, 4002);
}

#[test]
fn test_slots_only_config() {
    let config = PortalConfig::parse(
        r#"
[[slots]]
slot_key = "usb-1"
label = "SLOT1"
tcp_port = 4001
"#,
    )
    .unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    assert_eq!(config.server.log_level, "info");
    assert!(config.boot.enabled);
    assert_eq!(config.health.sweep_interval(), None);
    assert_eq!(config.slots.len(), 1);
}

#[test]
fn test_empty_config_has_no_slots() {
    let config = PortalConfig::parse("").unwrap();
    assert!(config.slots.is_empty());
}

#[test]
fn test_rejects_inconsistent_slots() {
    let duplicate_port = r#"
[[slots]]
slot_key = "a"
label = "A"
tcp_port = 4001

[[slots]]
slot_key = "b"
label = "B"
tcp_port = 4001
"#;
    let err = PortalConfig::parse(duplicate_port).unwrap_err();
    assert!(err.to_string().contains("4001"));

    let missing_port = r#"
[[slots]]
slot_key = "a"
label = "A"
"#;
    assert!(PortalConfig::parse(missing_port).is_err());
}

#[test]
fn test_rejects_bad_values() {
    assert!(PortalConfig::parse("[server]\nlog_level = \"loud\"\n").is_err());
    assert!(PortalConfig::parse("[timing]\nport_poll_attempts = 0\n").is_err());
    assert!(PortalConfig::parse("[proxy]\nexecutables = []\n").is_err());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("portal.toml");

    let original = PortalConfig::parse(FULL_CONFIG).unwrap();
    original.save(&path).unwrap();

    let loaded = PortalConfig::load(Some(path)).unwrap();
    assert_eq!(loaded.slots, original.slots);
    assert_eq!(loaded.server.bind_addr, original.server.bind_addr);
    assert_eq!(loaded.proxy.args, original.proxy.args);
    assert_eq!(
        loaded.health.sweep_interval(),
        original.health.sweep_interval()
    );
}

#[test]
fn test_load_reports_path_on_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("portal.toml");
    std::fs::write(&path, "[[slots]]\nslot_key = 3\n").unwrap();

    let err = PortalConfig::load(Some(path.clone())).unwrap_err();
    assert!(format!("{:#}", err).contains(&path.display().to_string()));

    let missing = PortalConfig::load(Some(dir.path().join("absent.toml")));
    assert!(missing.is_err());
}
