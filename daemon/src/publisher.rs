//! Local bus publisher

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::BusConfig;
use wattrelay_protocol::BusRecord;

/// Fire-and-forget multicast output to the trusted telemetry bus.
/// Downstream sinks never acknowledge anything.
pub struct BusPublisher {
    socket: UdpSocket,
    group: SocketAddr,
}

impl BusPublisher {
    /// Open the output socket with the configured TTL and egress
    /// interface
    pub fn new(config: &BusConfig) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .context("creating bus socket")?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        if let Some(interface) = config.interface {
            socket
                .set_multicast_if_v4(&interface)
                .with_context(|| format!("selecting egress interface {interface}"))?;
        }
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self {
            socket,
            group: config.group,
        })
    }

    /// Encode and send one record
    pub async fn publish(&self, record: &BusRecord) -> Result<()> {
        let payload = record.to_yaml()?;
        self.socket
            .send_to(payload.as_bytes(), self.group)
            .await
            .with_context(|| format!("sending to {}", self.group))?;
        debug!(group = %self.group, bytes = payload.len(), "Published reading");
        Ok(())
    }
}
