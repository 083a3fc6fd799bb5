//! Bridges DreamMaker IoT devices to an MQTT broker.
//!
//! Devices connect over TCP and speak a JSON envelope protocol. Each
//! connection becomes a [`session::Session`] that authenticates the device,
//! publishes its reports to `{base_topic}/{ip}` and forwards anything
//! published on `{base_topic}/{ip}/command` back to the device.

pub mod config;
pub mod error;
pub mod listener;
pub mod session;
pub mod transport;

pub use config::{BridgeConfig, ListenConfig};
pub use error::{SessionError, SessionResult};
pub use listener::Listener;
pub use session::{Session, SessionOutcome, SessionState};
