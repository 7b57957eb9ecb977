//! Host identity published in proxy URLs

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::debug;

/// Address and name under which proxies are advertised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub ip: String,
    pub hostname: String,
}

impl HostIdentity {
    /// Detect the outward-facing address and hostname
    ///
    /// `advertise_host` overrides the detected address.
    pub fn detect(advertise_host: Option<&str>) -> Self {
        let ip = advertise_host
            .map(str::to_string)
            .unwrap_or_else(|| outbound_ip().to_string());
        let hostname = local_hostname();
        debug!(%ip, %hostname, "Detected host identity");
        Self { ip, hostname }
    }

    pub fn localhost() -> Self {
        Self {
            ip: Ipv4Addr::LOCALHOST.to_string(),
            hostname: "localhost".to_string(),
        }
    }
}

/// Local address of the default route
///
/// Connecting a UDP socket sends no packets; it only selects the interface.
fn outbound_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(unix)]
fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn local_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}
