//! MQTT channel: one private broker connection per device session.
//!
//! Wraps `rumqttc::AsyncClient` behind the `Channel` trait and turns the
//! rumqttc `EventLoop` into an `Inbox` of subscribed messages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::error::{MqttError, MqttResult};
use crate::handler::BrokerMessage;
use crate::tls;

/// Capacity of both the rumqttc request queue and the inbox queue.
const QUEUE_CAPACITY: usize = 64;

/// How long `MqttInbox::close` waits for a queued DISCONNECT to be written.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Traits ────────────────────────────────────────────────────

/// Outbound half of a broker connection.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
    -> MqttResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;

    /// Close the broker connection.
    async fn disconnect(&self) -> MqttResult<()>;
}

/// Inbound half of a broker connection.
#[async_trait]
pub trait Inbox: Send {
    /// Wait for the next message on any subscription.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses
    /// no message. A closed connection yields an error, never a retry.
    async fn recv(&mut self) -> MqttResult<BrokerMessage>;

    /// Wait until anything queued on the outbound half, such as a
    /// DISCONNECT, has reached the broker. Call after `Channel::disconnect`.
    async fn close(&mut self) {}
}

/// Opens broker connections, one per device session.
#[async_trait]
pub trait Connector: Send + Sync {
    type Channel: Channel + 'static;
    type Inbox: Inbox + 'static;

    /// Connect with the given client id. Returns once the broker has
    /// accepted the connection.
    async fn connect(&self, client_id: &str) -> MqttResult<(Self::Channel, Self::Inbox)>;
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        (**self).publish(topic, payload, qos, retain).await
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        (**self).subscribe(filter, qos).await
    }

    async fn disconnect(&self) -> MqttResult<()> {
        (**self).disconnect().await
    }
}

// ── MqttChannel ───────────────────────────────────────────────

/// Outbound half of a rumqttc connection.
pub struct MqttChannel {
    client: AsyncClient,
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    async fn disconnect(&self) -> MqttResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| MqttError::Connection(e.to_string()))
    }
}

// ── MqttInbox ─────────────────────────────────────────────────

/// Inbound half of a rumqttc connection.
///
/// Owns the task driving the rumqttc event loop. `close` lets the driver
/// flush a pending DISCONNECT; dropping the inbox aborts it outright.
pub struct MqttInbox {
    rx: mpsc::Receiver<MqttResult<BrokerMessage>>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl Inbox for MqttInbox {
    async fn recv(&mut self) -> MqttResult<BrokerMessage> {
        self.rx.recv().await.unwrap_or(Err(MqttError::Disconnected))
    }

    async fn close(&mut self) {
        // The driver exits once the DISCONNECT is written or the link fails.
        // Keep draining so it never blocks on a full queue meanwhile.
        let rx = &mut self.rx;
        let drained = tokio::time::timeout(CLOSE_TIMEOUT, async {
            while rx.recv().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!("broker event loop did not stop in time, aborting");
        }
        self.driver.abort();
    }
}

impl Drop for MqttInbox {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

// ── MqttConnector ─────────────────────────────────────────────

/// Opens rumqttc connections using the bridge's broker settings.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    config: BrokerConfig,
}

impl MqttConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn options(&self, client_id: &str) -> MqttResult<MqttOptions> {
        let mut options = MqttOptions::new(client_id, &self.config.server, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keepalive_secs.into()));
        if let Some((user, password)) = self.config.credentials() {
            options.set_credentials(user, password);
        }
        options.set_transport(tls::load_transport(&self.config)?);
        Ok(options)
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Channel = MqttChannel;
    type Inbox = MqttInbox;

    async fn connect(&self, client_id: &str) -> MqttResult<(MqttChannel, MqttInbox)> {
        let options = self.options(client_id)?;
        let (client, mut eventloop) = AsyncClient::new(options, QUEUE_CAPACITY);

        wait_for_connack(&mut eventloop).await?;
        tracing::debug!(
            client_id,
            broker = %self.config.redacted_uri(),
            "broker connection accepted"
        );

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let driver = tokio::spawn(drive(eventloop, tx));

        Ok((MqttChannel { client }, MqttInbox { rx, driver }))
    }
}

/// Poll the event loop until the broker answers the CONNECT.
async fn wait_for_connack(eventloop: &mut EventLoop) -> MqttResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(MqttError::Connection(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(MqttError::Connection(e.to_string())),
        }
    }
}

/// Drive the event loop, forwarding subscribed publishes to the inbox.
///
/// The first loop error is forwarded and ends the driver; there is no
/// reconnect. A SUBACK rejecting a filter is forwarded too, but the link
/// stays up so the session can still send its DISCONNECT. A sent
/// DISCONNECT ends the driver quietly.
async fn drive(mut eventloop: EventLoop, tx: mpsc::Sender<MqttResult<BrokerMessage>>) {
    loop {
        let (forward, fatal) = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                (Ok(BrokerMessage::from(&publish)), false)
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if !ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    continue;
                }
                let err = MqttError::Subscribe(format!(
                    "broker rejected subscription (pkid {})",
                    ack.pkid
                ));
                (Err(err), false)
            }
            Ok(Event::Incoming(Packet::Disconnect)) => (Err(MqttError::Disconnected), true),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("broker disconnect sent, stopping event loop");
                return;
            }
            Ok(_) => continue, // PubAck, PingResp, etc.
            Err(e) => (Err(MqttError::Connection(e.to_string())), true),
        };

        if tx.send(forward).await.is_err() || fatal {
            return;
        }
    }
}
