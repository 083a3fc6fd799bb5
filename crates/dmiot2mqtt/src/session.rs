//! Per-connection device session.
//!
//! A session first runs the provisioning/auth handshake with the device,
//! then opens its own broker connection and relays in both directions:
//! device reports are acknowledged and published to the state topic, and
//! messages on the command topic are wrapped into commands for the device.
//! The session ends when the device closes the stream or either side fails.

use std::net::SocketAddr;

use dmiot_mqtt_channel::{BrokerConfig, BrokerMessage, Channel, Connector, Inbox, QoS};
use dmiot_protocol::topics::DeviceTopics;
use dmiot_protocol::{Command, DeviceMessage, ProtocolError, Reply};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::SessionResult;
use crate::transport::{DeviceTransport, Frame};

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The device closed the stream before completing the auth handshake.
    AuthenticationFailed,
    /// The device closed the stream after relaying.
    Closed,
}

pub struct Session<S> {
    peer: SocketAddr,
    transport: DeviceTransport<S>,
    topics: DeviceTopics,
    retain: bool,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr, config: &BrokerConfig) -> Self {
        let ip = peer.ip().to_canonical().to_string();
        Self {
            peer,
            transport: DeviceTransport::new(stream),
            topics: DeviceTopics::new(&config.base_topic, &ip),
            retain: config.retain,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Drive the session to completion.
    ///
    /// The transport is closed and the broker connection (if any) is
    /// disconnected before this returns, whatever the outcome.
    pub async fn run<K: Connector>(mut self, connector: &K) -> SessionResult<SessionOutcome> {
        match self.authenticate().await {
            Ok(true) => {}
            Ok(false) => {
                self.close().await;
                return Ok(SessionOutcome::AuthenticationFailed);
            }
            Err(e) => {
                self.close().await;
                return Err(e);
            }
        }

        let client_id = self.client_id();
        let (channel, mut inbox) = match connector.connect(&client_id).await {
            Ok(connection) => connection,
            Err(e) => {
                self.close().await;
                return Err(e.into());
            }
        };
        tracing::info!(client_id = %client_id, "broker connected");

        let result = self.relay(&channel, &mut inbox).await;

        if let Err(e) = channel.disconnect().await {
            tracing::warn!(error = %e, "failed to disconnect from broker");
        }
        inbox.close().await;
        self.close().await;

        result.map(|()| SessionOutcome::Closed)
    }

    /// Run the handshake until the device authenticates.
    ///
    /// Returns `false` if the stream ends first. Provisioning requests are
    /// answered any number of times; other envelopes are ignored.
    async fn authenticate(&mut self) -> SessionResult<bool> {
        loop {
            let message = match self.transport.read_frame().await? {
                Frame::Closed => return Ok(false),
                Frame::Malformed(e) => {
                    tracing::warn!(error = %e, "invalid payload from device, ignoring");
                    continue;
                }
                Frame::Message(message) => message,
            };

            match message {
                DeviceMessage::Provisioning(_) => {
                    tracing::info!("provisioning request, sending placeholder identity");
                    self.transport.send(Reply::provisioning()).await?;
                }
                DeviceMessage::Auth(envelope) => {
                    tracing::info!("auth handshake");
                    self.transport.send(Reply::ack(envelope.resource_id)).await?;
                    self.state = SessionState::Authenticated;
                    return Ok(true);
                }
                other => {
                    tracing::debug!(
                        resource_id = other.resource_id(),
                        "ignoring message before authentication"
                    );
                }
            }
        }
    }

    /// Relay between device and broker until the device closes the stream.
    async fn relay<C: Channel, I: Inbox>(&mut self, channel: &C, inbox: &mut I) -> SessionResult<()> {
        channel
            .subscribe(&self.topics.command, QoS::AtMostOnce)
            .await?;
        tracing::info!(topic = %self.topics.command, "subscribed to command topic");

        // Both reads are cancel-safe, so the branch that loses the race
        // keeps any pending data for the next iteration.
        loop {
            tokio::select! {
                frame = self.transport.read_frame() => match frame? {
                    Frame::Closed => {
                        tracing::info!("device closed the connection");
                        return Ok(());
                    }
                    Frame::Malformed(e) => {
                        tracing::warn!(error = %e, "invalid payload from device, ignoring");
                    }
                    Frame::Message(message) => self.handle_device_message(message, channel).await?,
                },
                message = inbox.recv() => self.handle_broker_message(message?).await?,
            }
        }
    }

    async fn handle_device_message<C: Channel>(
        &mut self,
        message: DeviceMessage,
        channel: &C,
    ) -> SessionResult<()> {
        let resource_id = message.resource_id();
        self.transport.send(Reply::ack(resource_id)).await?;

        if let DeviceMessage::Heartbeat(_) = message {
            tracing::trace!("heartbeat acknowledged");
            return Ok(());
        }

        let data = message.into_envelope().data.unwrap_or(Value::Null);
        let payload =
            serde_json::to_vec(&data).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        channel
            .publish(&self.topics.state, &payload, QoS::AtMostOnce, self.retain)
            .await?;
        tracing::debug!(resource_id, topic = %self.topics.state, "published device data");
        Ok(())
    }

    async fn handle_broker_message(&mut self, message: BrokerMessage) -> SessionResult<()> {
        let data = match message.decode_json() {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(topic = %message.topic, error = %e, "invalid command payload, ignoring");
                return Ok(());
            }
        };
        tracing::debug!(topic = %message.topic, command = %data, "received command");
        self.transport.send(Command::new(data)).await
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.shutdown().await {
            tracing::debug!(error = %e, "device transport already closed");
        }
        self.state = SessionState::Closed;
    }

    fn client_id(&self) -> String {
        let suffix = Uuid::now_v7().simple().to_string();
        format!(
            "dmiot2mqtt-{}-{}",
            self.peer.ip().to_canonical(),
            &suffix[suffix.len() - 8..]
        )
    }
}
