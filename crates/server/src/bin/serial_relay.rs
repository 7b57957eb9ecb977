//! serial-relay
//!
//! Minimal serial-over-TCP proxy. Binds the port before touching any client,
//! then relays bytes between one TCP client at a time and the device node.
//! Exits non-zero when the device itself fails, so a supervisor sees the
//! unplug as a dead process.

use anyhow::{Context, Result, bail};
use clap::Parser;
use common::setup_logging;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Pause after a zero-length device read
const IDLE_BACKOFF: Duration = Duration::from_millis(50);
const CHUNK_SIZE: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "serial-relay")]
#[command(author, version, about = "Relay a serial device over TCP")]
struct Args {
    /// Device node to relay
    #[arg(value_name = "DEVICE")]
    device: PathBuf,

    /// TCP port to listen on (all interfaces)
    #[arg(short, long)]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

type DeviceChunk = std::io::Result<Vec<u8>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level).context("Failed to setup logging")?;

    let reader = open_device(&args.device).await?;
    let mut writer = open_device(&args.device).await?;

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("Failed to bind port {}", args.port))?;
    info!(device = %args.device.display(), port = args.port, "Relay listening");

    let (tx, mut rx) = mpsc::channel::<DeviceChunk>(64);
    tokio::spawn(pump_device(reader, tx));

    loop {
        let (client, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
            chunk = rx.recv() => {
                // Nobody connected: discard device output
                check_chunk(chunk)?;
                continue;
            }
        };
        info!(%peer, "Client connected");
        match relay(client, &mut rx, &mut writer).await {
            Ok(()) => info!(%peer, "Client disconnected"),
            Err(RelayError::Client(e)) => warn!(%peer, "Client dropped: {}", e),
            Err(RelayError::Device(e)) => {
                error!("Device failure: {:#}", e);
                return Err(e);
            }
        }
    }
}

async fn open_device(path: &Path) -> Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.read(true).write(true);
    #[cfg(unix)]
    options.custom_flags(nix::fcntl::OFlag::O_NOCTTY.bits());
    options
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Read the device forever, forwarding chunks until the device fails
async fn pump_device(mut device: File, tx: mpsc::Sender<DeviceChunk>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match device.read(&mut buf).await {
            Ok(0) => tokio::time::sleep(IDLE_BACKOFF).await,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

fn check_chunk(chunk: Option<DeviceChunk>) -> Result<Vec<u8>> {
    match chunk {
        Some(Ok(data)) => Ok(data),
        Some(Err(e)) => Err(anyhow::Error::new(e).context("Device read failed")),
        None => bail!("Device reader stopped"),
    }
}

enum RelayError {
    Client(std::io::Error),
    Device(anyhow::Error),
}

async fn relay(
    mut client: TcpStream,
    rx: &mut mpsc::Receiver<DeviceChunk>,
    device: &mut File,
) -> std::result::Result<(), RelayError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        tokio::select! {
            chunk = rx.recv() => {
                let data = check_chunk(chunk).map_err(RelayError::Device)?;
                client.write_all(&data).await.map_err(RelayError::Client)?;
            }
            read = client.read(&mut buf) => {
                let n = read.map_err(RelayError::Client)?;
                if n == 0 {
                    return Ok(());
                }
                debug!("{} byte(s) to device", n);
                write_device(device, &buf[..n])
                    .await
                    .context("Device write failed")
                    .map_err(RelayError::Device)?;
            }
        }
    }
}

async fn write_device(device: &mut File, data: &[u8]) -> std::io::Result<()> {
    device.write_all(data).await?;
    device.flush().await
}
