//! Mock broker connections for testing without a real broker.
//!
//! `MockChannel` records publishes, subscriptions and disconnects for
//! assertion in tests. `MockInbox` is fed through an `InboxSender`.
//! `MockConnector` hands out one of each per connect call.

use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::channel::{Channel, Connector, Inbox};
use crate::error::{MqttError, MqttResult};
use crate::handler::BrokerMessage;

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

// ── MockChannel ───────────────────────────────────────────────

/// Mock implementation of the `Channel` trait.
///
/// Stores all publishes and subscriptions in memory for test verification.
/// Thread-safe via `Mutex` (fine for test contexts).
#[derive(Default)]
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    disconnected: Mutex<bool>,
    fail_subscribe: Mutex<bool>,
    fail_publish: Mutex<bool>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose every subscribe call fails.
    pub fn failing_subscribe() -> Self {
        let mock = Self::new();
        *mock.fail_subscribe.lock().unwrap() = true;
        mock
    }

    /// Make subsequent publish calls fail (or succeed again).
    pub fn set_fail_publish(&self, fail: bool) {
        *self.fail_publish.lock().unwrap() = fail;
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get all subscription filters.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock().unwrap()
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
        *self.disconnected.lock().unwrap() = false;
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> MqttResult<()> {
        if *self.fail_publish.lock().unwrap() {
            return Err(MqttError::Publish("mock publish failure".into()));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        if *self.fail_subscribe.lock().unwrap() {
            return Err(MqttError::Subscribe("mock subscribe failure".into()));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        *self.disconnected.lock().unwrap() = true;
        Ok(())
    }
}

// ── MockInbox ─────────────────────────────────────────────────

/// Test-side handle feeding a `MockInbox`.
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<MqttResult<BrokerMessage>>,
}

impl InboxSender {
    /// Deliver a publish as if the broker had sent it.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let _ = self.tx.send(Ok(BrokerMessage::new(topic, payload)));
    }

    /// Simulate a broken broker link.
    pub fn fail(&self, error: MqttError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Mock implementation of the `Inbox` trait.
///
/// Reports `MqttError::Disconnected` once every `InboxSender` is dropped.
pub struct MockInbox {
    rx: mpsc::UnboundedReceiver<MqttResult<BrokerMessage>>,
}

impl MockInbox {
    pub fn channel() -> (InboxSender, MockInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InboxSender { tx }, MockInbox { rx })
    }
}

#[async_trait]
impl Inbox for MockInbox {
    async fn recv(&mut self) -> MqttResult<BrokerMessage> {
        self.rx.recv().await.unwrap_or(Err(MqttError::Disconnected))
    }
}

// ── MockConnector ─────────────────────────────────────────────

/// One connection handed out by a `MockConnector`.
#[derive(Clone)]
pub struct MockConnection {
    pub client_id: String,
    pub channel: Arc<MockChannel>,
    pub inbox: InboxSender,
}

/// Mock implementation of the `Connector` trait.
#[derive(Default)]
pub struct MockConnector {
    connections: Mutex<Vec<MockConnection>>,
    refuse: bool,
    fail_subscribe: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector that rejects every connection attempt.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// A connector whose channels fail to subscribe.
    pub fn failing_subscribe() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::default()
        }
    }

    /// All connections handed out so far, in order.
    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.lock().unwrap().clone()
    }

    pub fn last_connection(&self) -> Option<MockConnection> {
        self.connections.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Channel = Arc<MockChannel>;
    type Inbox = MockInbox;

    async fn connect(&self, client_id: &str) -> MqttResult<(Arc<MockChannel>, MockInbox)> {
        if self.refuse {
            return Err(MqttError::Connection("mock broker refused connection".into()));
        }

        let channel = Arc::new(if self.fail_subscribe {
            MockChannel::failing_subscribe()
        } else {
            MockChannel::new()
        });
        let (sender, inbox) = MockInbox::channel();

        self.connections.lock().unwrap().push(MockConnection {
            client_id: client_id.to_string(),
            channel: channel.clone(),
            inbox: sender,
        });
        Ok((channel, inbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_messages() {
        let mock = MockChannel::new();
        mock.publish("test/topic", b"hello", QoS::AtMostOnce, false)
            .await
            .unwrap();
        mock.publish("test/other", b"world", QoS::AtMostOnce, true)
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "test/topic");
        assert_eq!(msgs[0].payload, b"hello");
        assert!(!msgs[0].retain);
        assert_eq!(msgs[1].topic, "test/other");
        assert!(msgs[1].retain);
    }

    #[tokio::test]
    async fn subscribe_records_filters() {
        let mock = MockChannel::new();
        mock.subscribe("dmiot2mqtt/10.0.0.5/command", QoS::AtMostOnce)
            .await
            .unwrap();

        assert!(mock.is_subscribed_to("dmiot2mqtt/10.0.0.5/command"));
        assert!(!mock.is_subscribed_to("dmiot2mqtt/10.0.0.6/command"));
    }

    #[tokio::test]
    async fn published_to_filter() {
        let mock = MockChannel::new();
        mock.publish("topic/a", b"1", QoS::AtMostOnce, false)
            .await
            .unwrap();
        mock.publish("topic/b", b"2", QoS::AtMostOnce, false)
            .await
            .unwrap();
        mock.publish("topic/a", b"3", QoS::AtMostOnce, false)
            .await
            .unwrap();

        assert_eq!(mock.published_to("topic/a").len(), 2);
        assert_eq!(mock.last_published().unwrap().payload, b"3");
    }

    #[tokio::test]
    async fn failure_injection() {
        let mock = MockChannel::failing_subscribe();
        assert!(mock.subscribe("f", QoS::AtMostOnce).await.is_err());

        mock.set_fail_publish(true);
        assert!(mock.publish("t", b"d", QoS::AtMostOnce, false).await.is_err());
        mock.set_fail_publish(false);
        assert!(mock.publish("t", b"d", QoS::AtMostOnce, false).await.is_ok());
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mock = MockChannel::new();
        mock.publish("t", b"d", QoS::AtMostOnce, false).await.unwrap();
        mock.subscribe("f", QoS::AtMostOnce).await.unwrap();
        mock.disconnect().await.unwrap();

        mock.reset();
        assert!(mock.published().is_empty());
        assert!(mock.subscriptions().is_empty());
        assert!(!mock.is_disconnected());
    }

    #[tokio::test]
    async fn inbox_delivers_in_order_then_disconnects() {
        let (sender, mut inbox) = MockInbox::channel();
        sender.deliver("a", b"1");
        sender.deliver("b", b"2");
        drop(sender);

        assert_eq!(inbox.recv().await.unwrap().topic, "a");
        assert_eq!(inbox.recv().await.unwrap().payload, b"2");
        assert!(matches!(inbox.recv().await, Err(MqttError::Disconnected)));
    }

    #[tokio::test]
    async fn connector_records_connections() {
        let connector = MockConnector::new();
        let (channel, _inbox) = connector.connect("client-1").await.unwrap();
        channel
            .publish("t", b"{}", QoS::AtMostOnce, false)
            .await
            .unwrap();

        let connections = connector.connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].client_id, "client-1");
        assert_eq!(connections[0].channel.published().len(), 1);
    }

    #[tokio::test]
    async fn refusing_connector() {
        let connector = MockConnector::refusing();
        let err = connector.connect("client-1").await.err().expect("should fail");
        assert!(matches!(err, MqttError::Connection(_)));
        assert!(connector.connections().is_empty());
    }
}
