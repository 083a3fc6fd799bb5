//! MQTT topic builders for bridged devices.
//!
//! Topic structure:
//! ```text
//! {prefix}/{device_ip}            device status, published by the bridge
//! {prefix}/{device_ip}/command    commands for the device, subscribed by the bridge
//! ```

const COMMAND_SUFFIX: &str = "command";

/// Topic receiving forwarded device data.
pub fn state_topic(prefix: &str, device_ip: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let device_ip = device_ip.to_lowercase();
    if prefix.is_empty() {
        device_ip
    } else {
        format!("{prefix}/{device_ip}")
    }
}

/// Topic the bridge subscribes to for device-bound commands.
pub fn command_topic(prefix: &str, device_ip: &str) -> String {
    format!("{}/{COMMAND_SUFFIX}", state_topic(prefix, device_ip))
}

/// Both topics of one device, derived once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub state: String,
    pub command: String,
}

impl DeviceTopics {
    pub fn new(prefix: &str, device_ip: &str) -> Self {
        Self {
            state: state_topic(prefix, device_ip),
            command: command_topic(prefix, device_ip),
        }
    }
}
