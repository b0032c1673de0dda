//! # qrgate-api: Binary Entry Point
//!
//! Connects to the broker, starts the session bridge, and serves the
//! observer stream and probes on the configured port (default 9000).

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use qrgate_api::AppState;
use qrgate_bridge::{Bridge, BridgeConfig, BridgeMetrics, FanOut, MqttTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    tracing::info!(?config, "configuration loaded");

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (mqtt, _mqtt_task) =
        MqttTransport::start(&config, inbound_tx).context("failed to start MQTT transport")?;
    let transport: Arc<dyn Transport> = Arc::new(mqtt);

    let issuer = qrgate_issuer_client::from_config(&config.issuer)
        .context("failed to build issuance gateway")?;
    tracing::info!(issuer = issuer.name(), "issuance gateway ready");

    let metrics = BridgeMetrics::new().context("failed to register metrics")?;
    let fanout = FanOut::default();
    let _heartbeat = fanout.spawn_heartbeat(config.heartbeat_interval);

    let bridge = Bridge::new(
        config.registry(),
        config.session_ttl,
        transport.clone(),
        inbound_rx,
        issuer,
        fanout.clone(),
    )
    .with_metrics(metrics.clone());
    let (handle, bridge_task) = bridge.spawn();

    let app = qrgate_api::app(AppState::new(fanout, metrics, transport));
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("qrgate-api listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    handle.shutdown();
    bridge_task.await.context("bridge task failed")?;
    tracing::info!("bridge stopped, exiting");
    Ok(())
}
