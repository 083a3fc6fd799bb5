use serde::Deserialize;

/// Broker connection settings, loaded from the `[mqtt]` table of the bridge config.
///
/// Every field is optional; omitted fields fall back to a plain connection
/// to `localhost:1883` without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname.
    pub server: String,
    /// Broker port.
    pub port: u16,
    /// Prefix for every device topic.
    pub base_topic: String,
    /// Broker username. Credentials are only sent when this is set.
    pub user: Option<String>,
    /// Broker password, ignored without `user`.
    pub password: Option<String>,
    /// Connect over TLS (`mqtts://`).
    pub use_ssl: bool,
    /// CA certificate (PEM) to trust instead of the platform roots.
    pub ca_cert_path: Option<String>,
    /// Retain flag applied to every device status publish.
    pub retain: bool,
    /// Keep-alive interval in seconds.
    pub keepalive_secs: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: 1883,
            base_topic: "dmiot2mqtt".to_string(),
            user: None,
            password: None,
            use_ssl: false,
            ca_cert_path: None,
            retain: false,
            keepalive_secs: 30,
        }
    }
}

impl BrokerConfig {
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl { "mqtts" } else { "mqtt" }
    }

    /// Connection URI with the password masked, safe for logging.
    pub fn redacted_uri(&self) -> String {
        let mut uri = format!("{}://", self.scheme());
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            uri.push_str(user);
            if self.password.as_deref().is_some_and(|p| !p.is_empty()) {
                uri.push_str(":***");
            }
            uri.push('@');
        }
        uri.push_str(&format!("{}:{}/", self.server, self.port));
        uri
    }

    /// Username/password pair to present to the broker, if any.
    pub fn credentials(&self) -> Option<(String, String)> {
        let user = self.user.as_deref().filter(|u| !u.is_empty())?;
        Some((
            user.to_string(),
            self.password.clone().unwrap_or_default(),
        ))
    }
}
