//! serial-portal
//!
//! Keeps one TCP serial proxy running per configured USB attachment point,
//! following devices as they are plugged and unplugged.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use common::setup_logging;
use protocol::{HotplugAction, HotplugEvent, Request, Response, SlotStatus};
use server::boot::{DeviceEnumerator, UdevEnumerator};
use server::config::{CONFIG_ENV, PortalConfig};
use server::host::HostIdentity;
use server::network::{ControlClient, ControlServer};
use server::{Portal, service};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "serial-portal")]
#[command(author, version, about = "Serial Portal - USB serial devices over TCP")]
#[command(long_about = "
Runs one serial-over-TCP proxy per configured USB port (slot) and keeps it
in step with hotplug events.

EXAMPLES:
    # Run the portal with default config
    serial-portal

    # Run as systemd service
    serial-portal run --service

    # Show slot status of a running portal
    serial-portal status

    # Forward a udev event (from a RUN+= rule; reads ACTION, DEVNAME, ID_PATH, DEVPATH)
    serial-portal hotplug

    # Restart a slot's proxy by hand
    serial-portal start platform-3f980000.usb-usb-0:1.2:1.0 /dev/ttyACM0

CONFIGURATION:
    The portal looks for configuration files in the following order:
    1. Path specified with --config or SERIAL_PORTAL_CONFIG
    2. ~/.config/serial-portal/portal.toml
    3. /etc/serial-portal/portal.toml
    4. Built-in defaults (no slots)
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Control address (defaults to [server] bind_addr)
    #[arg(long, value_name = "ADDR", global = true)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the portal (default)
    Run {
        /// Run as systemd service
        #[arg(long)]
        service: bool,
    },
    /// Show every slot of a running portal
    Status,
    /// Show host summary of a running portal
    Info,
    /// Forward a hotplug event to a running portal
    Hotplug {
        #[arg(long, env = "ACTION", value_enum)]
        action: Action,
        #[arg(long, env = "DEVNAME")]
        devnode: Option<String>,
        #[arg(long, env = "ID_PATH", default_value = "")]
        id_path: String,
        #[arg(long, env = "DEVPATH", default_value = "")]
        devpath: String,
    },
    /// Start (or restart) a configured slot's proxy
    Start { slot_key: String, devnode: String },
    /// Stop a slot's proxy
    Stop { slot_key: String },
    /// List attached serial devices and their slots, without starting anything
    ListDevices,
    /// Save default configuration to the default location and exit
    SaveConfig,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Action {
    Add,
    Remove,
}

impl From<Action> for HotplugAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Add => HotplugAction::Add,
            Action::Remove => HotplugAction::Remove,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run { service: false });

    if let Command::SaveConfig = command {
        let path = PortalConfig::default_path();
        PortalConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(path) => PortalConfig::load(Some(path)).context("Failed to load configuration")?,
        None => PortalConfig::load_or_default(),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    let addr = args.addr.unwrap_or_else(|| config.server.bind_addr.clone());

    match command {
        Command::Run { service } => run(config, addr, service).await,
        Command::ListDevices => list_devices(&config).await,
        Command::Status => {
            match call(&addr, Request::Status).await? {
                Response::Status {
                    slots,
                    host_ip,
                    hostname,
                } => print_status(&host_ip, &hostname, &slots),
                other => bail!("unexpected response: {:?}", other),
            }
            Ok(())
        }
        Command::Info => {
            match call(&addr, Request::Info).await? {
                Response::Info(info) => {
                    println!("Host:    {} ({})", info.hostname, info.host_ip);
                    println!(
                        "Slots:   {} running / {} configured",
                        info.slots_running, info.slots_configured
                    );
                }
                other => bail!("unexpected response: {:?}", other),
            }
            Ok(())
        }
        Command::Hotplug {
            action,
            devnode,
            id_path,
            devpath,
        } => {
            let event = HotplugEvent {
                action: action.into(),
                devnode: devnode.filter(|d| !d.is_empty()),
                id_path,
                devpath,
            };
            match call(&addr, Request::Hotplug { event }).await? {
                Response::Hotplug {
                    slot_key,
                    seq,
                    accepted,
                } => {
                    info!(slot = %slot_key, seq, accepted, "Event delivered");
                    Ok(())
                }
                other => bail!("unexpected response: {:?}", other),
            }
        }
        Command::Start { slot_key, devnode } => {
            control(&addr, Request::Start { slot_key, devnode }).await
        }
        Command::Stop { slot_key } => control(&addr, Request::Stop { slot_key }).await,
        Command::SaveConfig => Ok(()),
    }
}

async fn call(addr: &str, request: Request) -> Result<Response> {
    let mut client = ControlClient::connect(addr).await?;
    client.call(&request).await
}

async fn control(addr: &str, request: Request) -> Result<()> {
    match call(addr, request).await? {
        Response::Control {
            ok,
            slot_key,
            running,
            error,
        } => {
            let state = if running { "running" } else { "stopped" };
            println!("{}: {}", slot_key, state);
            if !ok {
                bail!("{}", error.unwrap_or_else(|| "control failed".to_string()));
            }
            Ok(())
        }
        other => bail!("unexpected response: {:?}", other),
    }
}

fn print_status(host_ip: &str, hostname: &str, slots: &[SlotStatus]) {
    println!("Host: {} ({})\n", hostname, host_ip);
    if slots.is_empty() {
        println!("No slots.");
        return;
    }
    for slot in slots {
        let label = slot.label.as_deref().unwrap_or("-");
        let port = slot
            .tcp_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {} port {} {}",
            slot.state_label(),
            label,
            port,
            slot.devnode.as_deref().unwrap_or("")
        );
        println!("      {}", slot.slot_key);
        if let Some(url) = &slot.url {
            println!("      URL: {}", url);
        }
        if let Some(err) = &slot.last_error {
            println!("      Last error: {}", err);
        }
    }
}

/// Enumerate attached devices and show which slot each maps to
async fn list_devices(config: &PortalConfig) -> Result<()> {
    let devices = UdevEnumerator::new(&config.boot)
        .enumerate()
        .await
        .context("Failed to enumerate devices")?;

    if devices.is_empty() {
        println!("No serial devices found.");
        return Ok(());
    }

    println!("Found {} serial device(s):\n", devices.len());
    for device in devices {
        let key = device.slot_key().unwrap_or("<no slot key>");
        let slot = config.slots.iter().find(|s| s.slot_key == key);
        match slot {
            Some(slot) => println!("  {} -> {} (port {})", device.devnode, slot.label, slot.tcp_port),
            None => println!("  {} -> unconfigured", device.devnode),
        }
        println!("      {}", key);
    }
    Ok(())
}

/// Run the portal until Ctrl+C or SIGTERM
async fn run(config: PortalConfig, addr: String, service_flag: bool) -> Result<()> {
    info!("serial-portal v{}", env!("CARGO_PKG_VERSION"));
    let service_mode = service_flag || config.server.service_mode;
    if service_mode && service::is_systemd() {
        info!("Running under systemd");
    }

    let host = HostIdentity::detect(config.server.advertise_host.as_deref());
    info!("Advertising proxies as {} ({})", host.ip, host.hostname);
    let portal = Arc::new(Portal::new(&config, host));
    info!("{} slot(s) configured", config.slots.len());

    // Before the control server exists, so no event can race the scan
    if config.boot.enabled {
        let enumerator = UdevEnumerator::new(&config.boot);
        if let Err(e) = portal.reconcile_boot(&enumerator).await {
            warn!("Boot scan failed: {:#}", e);
        }
    }

    let server = ControlServer::bind(&addr, Arc::clone(&portal)).await?;

    let watchdog = service_mode.then(service::spawn_watchdog_task).flatten();
    let sweep = config
        .health
        .sweep_interval()
        .map(|interval| portal.spawn_health_sweep(interval));

    if service_mode {
        let summary = portal.info();
        service::notify_ready().context("Failed to notify systemd ready")?;
        service::notify_status(&format!(
            "{}/{} proxies running",
            summary.slots_running, summary.slots_configured
        ))
        .context("Failed to send status to systemd")?;
    }

    info!("Press Ctrl+C to shutdown");
    if let Err(e) = server.run(shutdown_signal()).await {
        error!("Control server error: {:#}", e);
    }

    if service_mode {
        service::notify_stopping().context("Failed to notify systemd stopping")?;
    }
    if let Some(handle) = sweep {
        handle.abort();
    }
    if let Some(handle) = watchdog {
        handle.abort();
    }

    portal.shutdown().await;
    info!("Portal shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down gracefully..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }
}
