//! Device-to-MQTT bridge binary.
//!
//! Usage: `dmiot2mqtt [config-path]`. Log level is taken from `RUST_LOG`.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use dmiot_mqtt_channel::MqttConnector;
use dmiot2mqtt::{BridgeConfig, Listener};

const DEFAULT_CONFIG_PATH: &str = "dmiot2mqtt.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dmiot2mqtt starting");

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Arc::new(BridgeConfig::from_file(&config_path)?);
    tracing::info!(
        broker = %config.mqtt.redacted_uri(),
        base_topic = %config.mqtt.base_topic,
        retain = config.mqtt.retain,
        "config loaded"
    );

    // ── Device listener ─────────────────────────────────────────
    let connector = Arc::new(MqttConnector::new(config.mqtt.clone()));
    let listener = Listener::bind(
        (config.listen.host.as_str(), config.listen.port),
        config.clone(),
        connector,
    )
    .await?;
    tracing::info!(addr = %listener.local_addr()?, "listening for devices");

    tokio::select! {
        () = listener.run() => {
            tracing::error!("listener exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("dmiot2mqtt stopped");
    Ok(())
}
