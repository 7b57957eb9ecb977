//! Control server
//!
//! Accepts control connections and answers each request line with one
//! response line. Requests on one connection are handled in order; separate
//! connections run concurrently. A malformed line gets an error response and
//! never touches slot state.

use crate::portal::Portal;
use anyhow::{Context, Result};
use protocol::{ProtocolError, Request, Response, read_line_async, write_line_async};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub struct ControlServer {
    listener: TcpListener,
    portal: Arc<Portal>,
}

impl ControlServer {
    pub async fn bind(addr: &str, portal: Arc<Portal>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind control server on {}", addr))?;
        Ok(Self { listener, portal })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("Control server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept control connection: {}", e);
                        continue;
                    }
                },
            };

            let portal = Arc::clone(&self.portal);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, portal).await {
                    error!(%peer, "Control connection error: {:#}", e);
                }
            });
        }

        info!("Control server stopped");
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, portal: Arc<Portal>) -> Result<()> {
    debug!(%peer, "Control connection opened");
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let response = match read_line_async::<_, Request>(&mut reader).await {
            Ok(request) => dispatch(&portal, request).await,
            Err(ProtocolError::Closed) => break,
            Err(ProtocolError::Serialization(e)) => Response::error(format!("invalid request: {}", e)),
            Err(e) => {
                // Stream is out of sync after an oversized line or I/O error
                let _ = write_line_async(&mut writer, &Response::error(e.to_string())).await;
                return Err(e.into());
            }
        };
        write_line_async(&mut writer, &response).await?;
    }

    debug!(%peer, "Control connection closed");
    Ok(())
}

/// Execute one request against the portal
pub async fn dispatch(portal: &Portal, request: Request) -> Response {
    match request {
        Request::Hotplug { event } => match portal.handle_hotplug(event).await {
            Ok(ack) => Response::Hotplug {
                slot_key: ack.slot_key,
                seq: ack.seq,
                accepted: ack.accepted,
            },
            Err(e) => Response::error(e.to_string()),
        },

        Request::Status => {
            let host = portal.host();
            Response::Status {
                slots: portal.status(),
                host_ip: host.ip.clone(),
                hostname: host.hostname.clone(),
            }
        }

        Request::Info => Response::Info(portal.info()),

        Request::Start { slot_key, devnode } => {
            match portal.manual_start(&slot_key, &devnode).await {
                Ok(running) => Response::Control {
                    ok: running,
                    slot_key,
                    running,
                    error: None,
                },
                Err(e) => Response::Control {
                    ok: false,
                    slot_key,
                    running: false,
                    error: Some(e.to_string()),
                },
            }
        }

        Request::Stop { slot_key } => match portal.manual_stop(&slot_key).await {
            Ok(()) => Response::Control {
                ok: true,
                slot_key,
                running: false,
                error: None,
            },
            Err(e) => Response::Control {
                ok: false,
                slot_key,
                running: false,
                error: Some(e.to_string()),
            },
        },
    }
}
