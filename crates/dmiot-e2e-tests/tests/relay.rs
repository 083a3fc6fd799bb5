//! E2E tests for the device ↔ broker relay.

mod helpers;

use serde_json::json;

use dmiot_mqtt_channel::{BrokerConfig, MockConnector, QoS};
use helpers::{COMMAND_TOPIC, STATE_TOPIC, TestHarness, eventually, published_json};

/// Device status is acked and its data published to the state topic.
#[tokio::test]
async fn e2e_status_report_published() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    let ack = device.report(42, json!({"temp": 21})).await;
    assert_eq!(
        ack,
        json!({"action": 81, "resource_id": 42, "version": "zeico_3.0.0", "code": 0})
    );

    let published = eventually(|| {
        let published = connection.channel.published();
        (!published.is_empty()).then_some(published)
    })
    .await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, STATE_TOPIC);
    assert_eq!(published[0].qos, QoS::AtMostOnce);
    assert!(!published[0].retain);
    assert_eq!(published_json(&connection, STATE_TOPIC), vec![json!({"temp": 21})]);
}

/// Heartbeats are acked but never reach the broker.
#[tokio::test]
async fn e2e_heartbeat_not_forwarded() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    for _ in 0..3 {
        let ack = device.report(127, json!({"power": 1, "speed": 2})).await;
        assert_eq!(ack["resource_id"], 127);
    }
    // A regular report afterwards proves the heartbeats were processed first.
    device.report(42, json!({"temp": 22})).await;

    let published = eventually(|| {
        let published = published_json(&connection, STATE_TOPIC);
        (!published.is_empty()).then_some(published)
    })
    .await;
    assert_eq!(published, vec![json!({"temp": 22})]);
}

/// Broker commands are wrapped and delivered to the device.
#[tokio::test]
async fn e2e_broker_command_delivered() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    connection.inbox.deliver(COMMAND_TOPIC, br#"{"mode":1}"#);

    let command = device.recv().await;
    assert_eq!(
        command,
        json!({
            "action": 4,
            "resource_id": 9031,
            "version": "zeico_3.0.0",
            "msg_id": 0,
            "data": {"mode": 1}
        })
    );
}

/// Device reports preserve read order on the broker.
#[tokio::test]
async fn e2e_publish_order_preserved() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    for i in 0..5 {
        device.report(42, json!({"seq": i})).await;
    }

    let published = eventually(|| {
        let published = published_json(&connection, STATE_TOPIC);
        (published.len() == 5).then_some(published)
    })
    .await;
    let seqs: Vec<i64> = published.iter().map(|v| v["seq"].as_i64().unwrap()).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}

/// Commands preserve broker order on the device.
#[tokio::test]
async fn e2e_command_order_preserved() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    for speed in 1..=3 {
        connection
            .inbox
            .deliver(COMMAND_TOPIC, format!(r#"{{"speed":{speed}}}"#).as_bytes());
        let command = device.recv().await;
        assert_eq!(command["data"]["speed"], speed);
    }
}

/// Custom prefix and retain flag flow through to the broker.
#[tokio::test]
async fn e2e_custom_prefix_and_retain() {
    let mqtt = BrokerConfig {
        base_topic: "home/fans".into(),
        retain: true,
        ..BrokerConfig::default()
    };
    let h = TestHarness::start_with(mqtt, MockConnector::new()).await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);
    assert!(connection.channel.is_subscribed_to("home/fans/127.0.0.1/command"));

    device.report(42, json!({"on": true})).await;

    let published = eventually(|| {
        let published = connection.channel.published_to("home/fans/127.0.0.1");
        (!published.is_empty()).then_some(published)
    })
    .await;
    assert!(published[0].retain);
}

/// Closing the device connection disconnects the broker handle.
#[tokio::test]
async fn e2e_device_close_disconnects_broker() {
    let h = TestHarness::start().await;
    let mut device = h.connect_device().await;
    device.authenticate().await;
    let connection = h.wait_for_connections(1).await.remove(0);

    drop(device);

    eventually(|| connection.channel.is_disconnected().then_some(())).await;
}
