//! Route resolution against the live kernel routing table
//!
//! Answers "which local source address would the kernel use to reach this
//! destination". The lookup connects an unbound UDP socket to the
//! destination: connect on a datagram socket sends nothing, but it makes the
//! kernel select a route and bind the route's preferred source address, which
//! is then read back with `getsockname`. Every call re-queries the kernel so
//! interface and route changes show up on the next cycle.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::cancel::cancellable;
use crate::{Error, Result};

/// Port used for the connect. Nothing is ever sent to it.
const PROBE_PORT: u16 = 9;

/// Trait abstracting route lookups
///
/// Allows the reconciler to be tested with fixed route answers while the
/// real kernel lookup is used in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RouteResolver: Send + Sync {
    /// Resolve the source address the kernel would use to reach `destination`
    ///
    /// # Errors
    ///
    /// * `Error::InvalidInput` if `destination` is not an IP literal
    /// * `Error::NoRoute` if there is no route or it has no source address
    /// * `Error::Cancelled` if `cancel` fires first
    async fn resolve(&self, destination: &str, cancel: &CancellationToken) -> Result<IpAddr>;
}

/// Parse a route target, rejecting hostnames and empty strings
pub fn parse_target(destination: &str) -> Result<IpAddr> {
    if destination.is_empty() {
        return Err(Error::invalid_input("route target", "target IP is empty"));
    }
    destination.parse().map_err(|_| {
        Error::invalid_input(
            "route target",
            format!("'{destination}' is not an IP address"),
        )
    })
}

/// Kernel-backed resolver used in production
#[derive(Clone, Debug, Default)]
pub struct KernelRouteResolver;

impl KernelRouteResolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self
    }

    async fn lookup(destination: IpAddr) -> Result<IpAddr> {
        let target = destination.to_string();
        let bind_addr = match destination {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::no_route(&target, format!("failed to open probe socket: {e}")))?;
        socket
            .connect(SocketAddr::new(destination, PROBE_PORT))
            .await
            .map_err(|e| Error::no_route(&target, e.to_string()))?;
        let local = socket
            .local_addr()
            .map_err(|e| Error::no_route(&target, format!("failed to read source address: {e}")))?;

        if local.ip().is_unspecified() {
            return Err(Error::no_route(&target, "route has no source IP"));
        }
        Ok(local.ip())
    }
}

#[async_trait]
impl RouteResolver for KernelRouteResolver {
    async fn resolve(&self, destination: &str, cancel: &CancellationToken) -> Result<IpAddr> {
        let dst = parse_target(destination)?;
        trace!(target_ip = %dst, "Querying kernel route");
        let src = cancellable(cancel, "route lookup", || Self::lookup(dst)).await?;
        trace!(target_ip = %dst, source_ip = %src, "Resolved source address");
        Ok(src)
    }
}
