//! Device-facing TCP listener.
//!
//! Accepts device connections and drives each one as an independent
//! [`Session`] task. A failing session never affects the accept loop or
//! other sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dmiot_mqtt_channel::Connector;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::Instrument;

use crate::config::BridgeConfig;
use crate::session::{Session, SessionOutcome};

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Listener<K> {
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    connector: Arc<K>,
}

impl<K> Listener<K>
where
    K: Connector + 'static,
{
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: Arc<BridgeConfig>,
        connector: Arc<K>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config,
            connector,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept device connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let config = self.config.clone();
        let connector = self.connector.clone();
        let span = tracing::info_span!("session", peer = %peer);

        let task = async move {
            tracing::info!("device connected");
            let session = Session::new(stream, peer, &config.mqtt);
            match session.run(connector.as_ref()).await {
                Ok(SessionOutcome::Closed) => tracing::info!("session closed"),
                Ok(SessionOutcome::AuthenticationFailed) => {
                    tracing::warn!("device disconnected before authenticating")
                }
                Err(e) => tracing::error!(error = %e, "session aborted"),
            }
        };
        tokio::spawn(task.instrument(span));
    }
}
