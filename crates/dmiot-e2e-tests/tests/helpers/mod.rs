//! Shared test harness for E2E integration tests.
//!
//! Runs a real `Listener` on a loopback port with a `MockConnector` standing
//! in for the broker, and talks to it through plain TCP device clients.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use dmiot_mqtt_channel::{BrokerConfig, Connector, MockConnection, MockConnector};
use dmiot2mqtt::{BridgeConfig, Listener};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback peers all share this address, so they share topics too.
pub const STATE_TOPIC: &str = "dmiot2mqtt/127.0.0.1";
pub const COMMAND_TOPIC: &str = "dmiot2mqtt/127.0.0.1/command";

/// End-to-end harness: listener + mock broker connector.
pub struct TestHarness {
    pub addr: SocketAddr,
    pub connector: Arc<MockConnector>,
}

impl TestHarness {
    /// Start a listener with default broker settings.
    pub async fn start() -> Self {
        Self::start_with(BrokerConfig::default(), MockConnector::new()).await
    }

    pub async fn start_with(mqtt: BrokerConfig, connector: MockConnector) -> Self {
        let connector = Arc::new(connector);
        let addr = spawn_listener(mqtt, connector.clone()).await;
        Self { addr, connector }
    }

    pub async fn connect_device(&self) -> DeviceClient {
        DeviceClient::connect(self.addr).await
    }

    /// Wait until `count` sessions have connected and subscribed.
    pub async fn wait_for_connections(&self, count: usize) -> Vec<MockConnection> {
        eventually(|| {
            let connections = self.connector.connections();
            (connections.len() >= count
                && connections
                    .iter()
                    .all(|c| !c.channel.subscriptions().is_empty()))
            .then_some(connections)
        })
        .await
    }
}

/// Run a listener on a loopback port with any broker connector.
pub async fn spawn_listener<K: Connector + 'static>(
    mqtt: BrokerConfig,
    connector: Arc<K>,
) -> SocketAddr {
    let config = Arc::new(BridgeConfig {
        mqtt,
        ..BridgeConfig::default()
    });
    let listener = Listener::bind("127.0.0.1:0", config, connector)
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(listener.run());
    addr
}

/// A fake device speaking the envelope protocol over TCP.
pub struct DeviceClient {
    stream: TcpStream,
}

impl DeviceClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to bridge");
        Self { stream }
    }

    pub async fn send(&mut self, value: Value) {
        self.send_raw(&serde_json::to_vec(&value).unwrap()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write to bridge");
    }

    /// Read one message from the bridge.
    pub async fn recv(&mut self) -> Value {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for the bridge")
            .expect("read from bridge");
        assert!(n > 0, "bridge closed the connection");
        serde_json::from_slice(&buf[..n]).expect("bridge sent invalid JSON")
    }

    /// Assert the bridge closes the connection.
    pub async fn expect_closed(&mut self) {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for the bridge to close")
            .unwrap_or(0);
        assert_eq!(n, 0, "expected the bridge to close the connection");
    }

    /// Run the auth handshake and return the ack.
    pub async fn authenticate(&mut self) -> Value {
        self.send(json!({"action": 1, "resource_id": 2001, "version": "zeico_3.0.0"}))
            .await;
        self.recv().await
    }

    /// Send a status report and return the ack.
    pub async fn report(&mut self, resource_id: i64, data: Value) -> Value {
        self.send(json!({
            "action": 2,
            "resource_id": resource_id,
            "version": "zeico_3.0.0",
            "data": data,
        }))
        .await;
        self.recv().await
    }
}

/// Await `future`, failing the test if it takes longer than the timeout.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("timed out waiting on the broker side")
}

/// Poll `check` until it yields a value or the timeout elapses.
pub async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if let Some(value) = check() {
            return value;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {TIMEOUT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Payloads published to `topic`, decoded as JSON.
pub fn published_json(connection: &MockConnection, topic: &str) -> Vec<Value> {
    connection
        .channel
        .published_to(topic)
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).expect("published invalid JSON"))
        .collect()
}
