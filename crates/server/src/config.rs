//! Portal configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration path
pub const CONFIG_ENV: &str = "SERIAL_PORTAL_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub boot: BootSettings,
    /// Physical attachment points with an assigned proxy port
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Control channel listen address
    #[serde(default = "ServerSettings::default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub service_mode: bool,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
    /// Host name or address published in proxy URLs (auto-detected if unset)
    #[serde(default)]
    pub advertise_host: Option<String>,
    #[serde(default = "ServerSettings::default_url_scheme")]
    pub url_scheme: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            service_mode: false,
            log_level: Self::default_log_level(),
            advertise_host: None,
            url_scheme: Self::default_url_scheme(),
        }
    }
}

impl ServerSettings {
    fn default_bind_addr() -> String {
        "127.0.0.1:8080".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_url_scheme() -> String {
        "rfc2217".to_string()
    }
}

/// How the proxy process is launched
///
/// The first existing entry of `executables` is run with `args`, where
/// `{port}` and `{devnode}` are substituted per slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "ProxySettings::default_executables")]
    pub executables: Vec<PathBuf>,
    #[serde(default = "ProxySettings::default_args")]
    pub args: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            executables: Self::default_executables(),
            args: Self::default_args(),
        }
    }
}

impl ProxySettings {
    fn default_executables() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/local/bin/serial-relay"),
            PathBuf::from("/usr/bin/serial-relay"),
        ]
    }

    fn default_args() -> Vec<String> {
        vec![
            "--port".to_string(),
            "{port}".to_string(),
            "{devnode}".to_string(),
        ]
    }

    /// First configured executable that exists on disk
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        self.executables
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref()))
            .find(|p| p.exists())
    }

    /// Argument list with placeholders filled in
    pub fn render_args(&self, port: u16, devnode: &str) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{port}", &port).replace("{devnode}", devnode))
            .collect()
    }
}

/// Bounded waits used by the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Budget for the device node to become openable
    pub device_ready_timeout_ms: u64,
    pub device_poll_interval_ms: u64,
    /// Delay before checking the proxy did not exit immediately
    pub grace_period_ms: u64,
    pub port_poll_interval_ms: u64,
    pub port_poll_attempts: u32,
    /// Per-attempt TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Budget between graceful signal and forced kill
    pub stop_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            device_ready_timeout_ms: 5000,
            device_poll_interval_ms: 100,
            grace_period_ms: 500,
            port_poll_interval_ms: 100,
            port_poll_attempts: 20,
            connect_timeout_ms: 1000,
            stop_timeout_ms: 5000,
        }
    }
}

impl TimingSettings {
    pub fn device_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.device_ready_timeout_ms)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn port_poll_interval(&self) -> Duration {
        Duration::from_millis(self.port_poll_interval_ms)
    }

    /// Total port readiness budget (interval x attempts)
    pub fn port_ready_budget(&self) -> Duration {
        self.port_poll_interval() * self.port_poll_attempts
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Proxy health policy
///
/// Health is always refreshed when status is read. A non-zero
/// `sweep_interval_secs` additionally runs a periodic background check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl HealthSettings {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Startup scan of already attached devices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootSettings {
    pub enabled: bool,
    pub dev_dir: PathBuf,
    /// Device node name prefixes to consider (e.g. `ttyACM`)
    pub device_prefixes: Vec<String>,
    pub udevadm: PathBuf,
    pub query_timeout_ms: u64,
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dev_dir: PathBuf::from("/dev"),
            device_prefixes: vec!["ttyACM".to_string(), "ttyUSB".to_string()],
            udevadm: PathBuf::from("udevadm"),
            query_timeout_ms: 5000,
        }
    }
}

impl BootSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// One configured slot
///
/// # Example Configuration
/// ```toml
/// [[slots]]
/// slot_key = "platform-3f980000.usb-usb-0:1.2:1.0"
/// label = "SLOT1"
/// tcp_port = 4001
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// udev `ID_PATH` (or `DEVPATH`) of the attachment point
    pub slot_key: String,
    pub label: String,
    pub tcp_port: u16,
}

impl PortalConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/serial-portal/portal.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!(
            "Loaded {} slot(s) from: {}",
            config.slots.len(),
            config_path.display()
        );
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: PortalConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults (no slots) if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}, starting with no slots", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("serial-portal").join("portal.toml")
        } else {
            PathBuf::from(".config/serial-portal/portal.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.timing.port_poll_attempts == 0 {
            return Err(anyhow!("timing.port_poll_attempts must be at least 1"));
        }

        if self.proxy.executables.is_empty() {
            return Err(anyhow!("proxy.executables must list at least one path"));
        }

        let mut keys = HashSet::new();
        let mut ports = HashSet::new();
        for slot in &self.slots {
            if slot.slot_key.trim().is_empty() {
                return Err(anyhow!("Empty slot_key for slot '{}'", slot.label));
            }
            if !keys.insert(slot.slot_key.as_str()) {
                return Err(anyhow!("Duplicate slot_key '{}'", slot.slot_key));
            }
            if slot.tcp_port == 0 {
                return Err(anyhow!("Slot '{}' has tcp_port 0", slot.label));
            }
            if !ports.insert(slot.tcp_port) {
                return Err(anyhow!(
                    "tcp_port {} assigned to more than one slot",
                    slot.tcp_port
                ));
            }
        }

        Ok(())
    }
}
