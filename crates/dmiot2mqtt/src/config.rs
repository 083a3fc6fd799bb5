//! Bridge configuration, loadable from TOML.

use std::path::Path;

use dmiot_mqtt_channel::BrokerConfig;
use serde::Deserialize;

/// Top-level configuration for the bridge.
///
/// Constructed once at startup and shared read-only with every session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Where devices connect.
    pub listen: ListenConfig,
    /// Broker connection settings.
    pub mqtt: BrokerConfig,
}

/// Device-facing listener address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 31270,
        }
    }
}

impl BridgeConfig {
    /// Load config from a TOML file path.
    ///
    /// A missing file is not an error: the bridge falls back to defaults
    /// (plain broker on localhost).
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "config file not found, falling back to defaults"
            );
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }
}
