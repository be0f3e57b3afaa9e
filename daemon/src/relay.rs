//! The relay receive loop
//!
//! One datagram is fully processed (classify, reply, publish, update
//! state) before the next read, so the replay window and rate-limit
//! clock always see a consistent, monotonically-updated view. Nothing
//! that happens on a single datagram is fatal to the loop.

use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use wattrelay_protocol::{
    BusRecord, Classifier, MAX_DATAGRAM_LEN, ResponseBuilder, ServerTime, Token, Verdict,
};

use crate::config::RelayConfig;
use crate::metrics::Metrics;
use crate::publisher::BusPublisher;

/// Global metrics instance
static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);

/// The meter-facing relay: one UDP socket in, the bus out
pub struct Relay {
    socket: UdpSocket,
    classifier: Classifier,
    responder: ResponseBuilder,
    publisher: BusPublisher,
    serial_number: String,
    model: String,
}

impl Relay {
    /// Bind the listen socket and open the bus output
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let enc_key = config.security.enc_key()?;
        let mac_key = config.security.mac_key()?;

        let socket = UdpSocket::bind(config.server.listen)
            .await
            .with_context(|| format!("binding {}", config.server.listen))?;
        let publisher = BusPublisher::new(&config.bus)?;

        Ok(Self {
            socket,
            classifier: Classifier::new(&enc_key, mac_key),
            responder: ResponseBuilder::new(&enc_key, mac_key),
            publisher,
            serial_number: config.meter.serial_number.clone(),
            model: config.meter.model.clone(),
        })
    }

    /// Address the meter-facing socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking receive loop; returns only on socket failure
    pub async fn run(mut self) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            self.process(&buf[..len], peer).await;
        }
    }

    async fn process(&mut self, datagram: &[u8], peer: SocketAddr) {
        METRICS.datagrams_received.inc();

        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        match self
            .classifier
            .classify(datagram, Instant::now(), wall.as_secs())
        {
            Verdict::Drop(reason) => {
                // Silent on the wire; visible only here.
                METRICS
                    .datagrams_dropped
                    .with_label_values(&[reason.as_str()])
                    .inc();
                debug!(%peer, %reason, len = datagram.len(), "Dropped datagram");
            }
            Verdict::TimeSync { token } => {
                self.reply(&token, &[], peer).await;
                info!(%peer, "Received time sync request");
            }
            Verdict::Batch {
                token,
                readings,
                acks,
                fresh,
            } => {
                self.reply(&token, &acks, peer).await;

                let mut published = 0usize;
                for reading in readings.iter().filter(|r| fresh.contains(&r.timestamp)) {
                    let record =
                        BusRecord::from_reading(&self.serial_number, &self.model, reading);
                    match self.publisher.publish(&record).await {
                        Ok(()) => {
                            METRICS.readings_published.inc();
                            published += 1;
                        }
                        Err(e) => {
                            METRICS.publish_errors.inc();
                            warn!("Bus publish failed: {e:#}");
                        }
                    }
                }

                let delay_ms = readings
                    .last()
                    .map(|r| (wall.as_secs_f64() - f64::from(r.timestamp)) * 1000.0)
                    .unwrap_or_default();
                info!(
                    %peer,
                    "Received {} readings ({} new) with delay {:.1}ms",
                    readings.len(),
                    published,
                    delay_ms
                );
            }
        }
    }

    /// Send one reply; a failed send is logged and never retried
    async fn reply(&self, token: &Token, acks: &[u32], peer: SocketAddr) {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let time = ServerTime {
            secs: wall.as_secs() as u32,
            micros: wall.subsec_micros(),
        };

        let datagram = self.responder.build(token, time, acks);
        match self.socket.send_to(&datagram, peer).await {
            Ok(_) => METRICS.replies_sent.inc(),
            Err(e) => warn!(%peer, "Reply send failed: {e}"),
        }
    }
}
