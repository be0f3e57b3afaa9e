//! wattrelay bus watcher
//!
//! Subscribes to the local telemetry bus and prints one line per
//! reading. Records from other sources on the bus that do not parse
//! are skipped with a warning; the watcher never exits over bad input.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result, bail};
use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

use wattrelay_protocol::{BusRecord, MAX_DATAGRAM_LEN};

/// Watch readings on the local telemetry bus
#[derive(Parser, Debug)]
#[command(name = "wattrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Multicast group to subscribe to
    #[arg(long, default_value = "239.192.160.217:16021")]
    group: SocketAddr,

    /// Local address of the interface to join the group on
    #[arg(long)]
    interface: Option<Ipv4Addr>,

    /// Only show readings from these meter serial numbers
    #[arg(short, long)]
    serial: Vec<String>,

    /// Only accept records from these source addresses
    #[arg(long)]
    source: Vec<IpAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let socket = subscribe(&args)?;

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        let (len, sender) = socket.recv_from(&mut buf).await?;

        if !args.source.is_empty() && !args.source.contains(&sender.ip()) {
            continue;
        }

        let Ok(text) = std::str::from_utf8(&buf[..len]) else {
            warn!(%sender, "Skipping non-UTF-8 bus record");
            continue;
        };
        let record = match BusRecord::from_yaml(text) {
            Ok(record) => record,
            Err(e) => {
                warn!(%sender, "Skipping malformed bus record: {e}");
                continue;
            }
        };

        if !args.serial.is_empty() && !args.serial.contains(&record.meter.serial_number) {
            continue;
        }

        println!("{}", format_reading(&record));
    }
}

/// Join the multicast group on the requested interface
fn subscribe(args: &Args) -> Result<UdpSocket> {
    let IpAddr::V4(group) = args.group.ip() else {
        bail!("bus group must be an IPv4 multicast address");
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("creating bus socket")?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.group.port())).into())?;
    socket
        .join_multicast_v4(&group, &args.interface.unwrap_or(Ipv4Addr::UNSPECIFIED))
        .with_context(|| format!("joining {group}"))?;

    Ok(UdpSocket::from_std(socket.into())?)
}

/// One reading per line, units matching the meter's field semantics
fn format_reading(record: &BusRecord) -> String {
    let r = &record.meter.reading;
    format!(
        "{} serialNumber={}, voltage={:.1} V, current={:.1} A, frequency={:.1} Hz, \
         activePower={} W, reactivePower={} var, apparentPower={} VA, \
         powerFactor={:.1} %, temperature={} °C, \
         activeEnergy={:09.2} kW·h, reactiveEnergy={:09.2} kW·h (rtt {:.3} ms)",
        record.timestamp,
        record.meter.serial_number,
        r.voltage,
        r.current,
        r.frequency,
        r.active_power,
        r.reactive_power,
        r.apparent_power,
        r.power_factor,
        r.temperature,
        r.active_energy,
        r.reactive_energy,
        record.rtt,
    )
}
