//! Local TCP port probe.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Whether some local socket still holds `port`.
///
/// The port is free when it can be bound on the IPv4 and IPv6 wildcard
/// addresses; a listener on any local address makes that bind fail with
/// `AddrInUse`. When binding is not permitted at all (privileged ports for an
/// unprivileged caller) this falls back to a loopback connect within `timeout`.
pub async fn port_in_use(port: u16, timeout: Duration) -> bool {
    for addr in [
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    ] {
        match TcpListener::bind((addr, port)).await {
            Ok(listener) => drop(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                log::trace!("port {} still bound ({})", port, addr);
                return true;
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                log::debug!("cannot bind port {}: {}; probing with a connect", port, e);
                return accepts_connections(port, timeout).await;
            }
            // No IPv6 stack, for instance.
            Err(e) => log::trace!("bind check of {} on {} skipped: {}", port, addr, e),
        }
    }
    false
}

async fn accepts_connections(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await,
        Ok(Ok(_))
    )
}
