//! Prometheus diagnostics
//!
//! Dropped datagrams must stay invisible on the wire, so the counters
//! here are the only place the drop reasons surface outside the logs.

use crate::config::MonitoringConfig;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Global metrics registry
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Metrics struct
pub struct Metrics {
    pub datagrams_received: IntCounter,
    pub datagrams_dropped: IntCounterVec,
    pub replies_sent: IntCounter,
    pub readings_published: IntCounter,
    pub publish_errors: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let datagrams_received = IntCounter::with_opts(Opts::new(
            "wattrelay_datagrams_received_total",
            "Total datagrams read from the meter link",
        ))
        .unwrap();

        let datagrams_dropped = IntCounterVec::new(
            Opts::new(
                "wattrelay_datagrams_dropped_total",
                "Total datagrams silently dropped, by reason",
            ),
            &["reason"],
        )
        .unwrap();

        let replies_sent = IntCounter::with_opts(Opts::new(
            "wattrelay_replies_sent_total",
            "Total echo/time-sync replies sent",
        ))
        .unwrap();

        let readings_published = IntCounter::with_opts(Opts::new(
            "wattrelay_readings_published_total",
            "Total readings published on the local bus",
        ))
        .unwrap();

        let publish_errors = IntCounter::with_opts(Opts::new(
            "wattrelay_publish_errors_total",
            "Total failed bus publications",
        ))
        .unwrap();

        // Register metrics
        REGISTRY.register(Box::new(datagrams_received.clone())).ok();
        REGISTRY.register(Box::new(datagrams_dropped.clone())).ok();
        REGISTRY.register(Box::new(replies_sent.clone())).ok();
        REGISTRY.register(Box::new(readings_published.clone())).ok();
        REGISTRY.register(Box::new(publish_errors.clone())).ok();

        Self {
            datagrams_received,
            datagrams_dropped,
            replies_sent,
            readings_published,
            publish_errors,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics server
pub fn start_server(config: &MonitoringConfig) -> JoinHandle<()> {
    let bind = config.prometheus_bind;
    let enabled = config.prometheus_enabled;

    tokio::spawn(async move {
        if !enabled {
            info!("Prometheus metrics disabled");
            return;
        }

        use bytes::Bytes;
        use http_body_util::Full;
        use hyper::{Response, server::conn::http1, service::service_fn};
        use hyper_util::rt::TokioIo;

        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind metrics server: {}", e);
                return;
            }
        };

        info!("Prometheus metrics server listening on {}", bind);

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(r) => r,
                Err(e) => {
                    error!("Metrics accept error: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let service = service_fn(|_req| async {
                    use prometheus::Encoder;

                    let encoder = prometheus::TextEncoder::new();
                    let mut buffer = Vec::new();
                    encoder.encode(&REGISTRY.gather(), &mut buffer).unwrap();

                    Ok::<_, std::convert::Infallible>(
                        Response::builder()
                            .header("Content-Type", "text/plain")
                            .body(Full::new(Bytes::from(buffer)))
                            .unwrap(),
                    )
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics connection error: {}", e);
                }
            });
        }
    })
}
