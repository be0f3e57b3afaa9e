//! Daemon configuration

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Listen socket for the remote meter link
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity of the metered device
    pub meter: MeterConfig,

    /// Local telemetry bus output
    #[serde(default)]
    pub bus: BusConfig,

    /// Pre-shared keys
    pub security: SecurityConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl RelayConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config: RelayConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Listen socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the meter-facing UDP socket
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:16021".parse().unwrap()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Meter identity, stamped onto every published bus record
#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    /// Power meter serial number
    pub serial_number: String,

    /// Meter model string
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "RI-D19-80-C".to_string()
}

/// Local telemetry bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Multicast group readings are published to
    #[serde(default = "default_group")]
    pub group: SocketAddr,

    /// Local address of the egress interface, if not the default route
    #[serde(default)]
    pub interface: Option<Ipv4Addr>,

    /// Multicast TTL; the bus is link-local
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_group() -> SocketAddr {
    "239.192.160.217:16021".parse().unwrap()
}

fn default_ttl() -> u32 {
    1
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            interface: None,
            ttl: default_ttl(),
        }
    }
}

/// Pre-shared keys, hex-encoded and configured out-of-band
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// AES-128 encryption key (32 hex digits)
    pub enc_key: String,

    /// HMAC-SHA256 authentication key (64 hex digits)
    pub mac_key: String,
}

impl SecurityConfig {
    /// Decoded encryption key
    pub fn enc_key(&self) -> Result<[u8; 16]> {
        decode_key(&self.enc_key, "enc_key")
    }

    /// Decoded authentication key
    pub fn mac_key(&self) -> Result<[u8; 32]> {
        decode_key(&self.mac_key, "mac_key")
    }
}

fn decode_key<const N: usize>(value: &str, name: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value).with_context(|| format!("{name} is not valid hex"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow!("{name} must be {N} bytes, got {len}"))
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Prometheus metrics bind address
    #[serde(default = "default_prometheus_bind")]
    pub prometheus_bind: SocketAddr,

    /// Enable Prometheus
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

fn default_prometheus_bind() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

fn default_true() -> bool {
    true
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_bind: default_prometheus_bind(),
            prometheus_enabled: default_true(),
        }
    }
}
