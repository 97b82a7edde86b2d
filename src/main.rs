//! Amigo Gateway - Mesh current-sensor to cloud bridge
//!
//! Main entry point for the gateway daemon. The radio integration runs as
//! a separate process and pipes newline-delimited JSON transport events to
//! stdin.

use amigo_gateway::{
    aggregator::ReadingAggregator,
    config::GatewayConfig,
    dispatch_gate::DispatchGate,
    forwarder::HttpForwarder,
    gateway::{EventSender, Gateway},
    membership::MembershipTracker,
    mesh::NetworkEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Feed transport events from stdin into the pump
///
/// Malformed lines are skipped with a warning; the stream closing shuts
/// the gateway down.
async fn run_transport_bridge(events: EventSender) -> amigo_gateway::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match NetworkEvent::from_json_line(line) {
            Ok(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed transport line");
            }
        }
    }

    tracing::info!("Transport stream closed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amigo_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Amigo Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = GatewayConfig::default();
    tracing::info!(
        sink_url = %config.sink_url,
        send_interval_secs = config.send_interval_secs,
        sink_timeout_secs = config.sink_timeout_secs,
        "Configuration loaded"
    );

    // Initialize components
    let forwarder = Arc::new(HttpForwarder::with_timeout(
        config.sink_url.clone(),
        Duration::from_secs(config.sink_timeout_secs),
    ));
    tracing::info!("HttpForwarder initialized");

    let gate = DispatchGate::new(chrono::Duration::seconds(config.send_interval_secs as i64));
    let aggregator = Arc::new(ReadingAggregator::new(gate, forwarder));
    tracing::info!("ReadingAggregator initialized");

    let membership = MembershipTracker::new(aggregator.clone());
    tracing::info!("MembershipTracker initialized");

    let (gateway, events) = Gateway::new(aggregator.clone(), membership);

    // Periodic status log
    let status_aggregator = aggregator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let tracked = status_aggregator.device_count().await;
            tracing::info!(devices = tracked, "Gateway status");
        }
    });

    // Transport bridge (stdin JSONL from the radio integration)
    tokio::spawn(async move {
        if let Err(e) = run_transport_bridge(events).await {
            tracing::error!(error = %e, "Transport bridge failed");
        }
    });

    // Run until the transport closes or a shutdown signal arrives
    tokio::select! {
        _ = gateway.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
