//! MQTT channel for bridged devices.
//!
//! Provides the broker side of a device session:
//! - `Channel` trait for publish/subscribe/disconnect (mockable in tests)
//! - `Inbox` trait for receiving the next subscribed message
//! - `Connector` trait opening one private broker connection per session
//! - `MqttConnector` backed by rumqttc for production
//! - `MockChannel`, `MockInbox` and `MockConnector` for testing without a broker
//! - `FakeBroker`, a scripted loopback broker for testing `MqttConnector`

pub mod channel;
pub mod config;
pub mod error;
pub mod fake_broker;
pub mod handler;
pub mod mock;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, Connector, Inbox, MqttChannel, MqttConnector, MqttInbox};
pub use config::BrokerConfig;
pub use error::{MqttError, MqttResult};
pub use fake_broker::{FakeBroker, FakeBrokerConnection};
pub use handler::BrokerMessage;
pub use mock::{InboxSender, MockChannel, MockConnection, MockConnector, MockInbox, PublishedMessage};
pub use rumqttc::QoS;
