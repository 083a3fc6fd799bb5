//! Transport selection for broker connections.
//!
//! `use_ssl = false` connects over plain TCP. With `use_ssl = true` the
//! broker certificate is verified against `ca_cert_path` when configured,
//! otherwise against the platform root store.

use rumqttc::{TlsConfiguration, Transport};

use crate::config::BrokerConfig;
use crate::error::{MqttError, MqttResult};

/// Build the rumqttc transport matching the config.
pub fn load_transport(config: &BrokerConfig) -> MqttResult<Transport> {
    if !config.use_ssl {
        return Ok(Transport::Tcp);
    }

    let Some(ca_path) = config.ca_cert_path.as_deref() else {
        return Ok(Transport::tls_with_default_config());
    };

    let ca = std::fs::read(ca_path)
        .map_err(|e| MqttError::Tls(format!("failed to read CA cert '{ca_path}': {e}")))?;

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: None,
    }))
}
