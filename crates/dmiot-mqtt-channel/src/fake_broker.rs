//! Scripted MQTT 3.1.1 broker on a loopback socket.
//!
//! Speaks just enough of the wire protocol to exercise `MqttConnector`
//! against real packets: each test drives the broker side by hand, one
//! packet at a time.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::BrokerConfig;

pub const CONNECT: u8 = 0x10;
pub const PUBLISH: u8 = 0x30;
pub const SUBSCRIBE: u8 = 0x82;
pub const DISCONNECT: u8 = 0xE0;

/// SUBACK return code for a rejected filter.
pub const SUBACK_FAILURE: u8 = 0x80;

pub struct FakeBroker {
    listener: TcpListener,
}

impl FakeBroker {
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    /// Plain-TCP broker settings pointing at this broker.
    pub fn config(&self) -> std::io::Result<BrokerConfig> {
        Ok(BrokerConfig {
            server: "127.0.0.1".into(),
            port: self.listener.local_addr()?.port(),
            ..BrokerConfig::default()
        })
    }

    /// Accept one client and consume its CONNECT, without answering it.
    pub async fn accept(&self) -> std::io::Result<FakeBrokerConnection> {
        let (stream, _) = self.listener.accept().await?;
        let mut connection = FakeBrokerConnection { stream };
        let (header, _) = connection.read_packet().await?;
        if header & 0xF0 != CONNECT {
            return Err(std::io::Error::other(format!(
                "expected CONNECT, got {header:#04x}"
            )));
        }
        Ok(connection)
    }

    /// Accept one client and let it in.
    pub async fn accept_connected(&self) -> std::io::Result<FakeBrokerConnection> {
        let mut connection = self.accept().await?;
        connection.connack(0).await?;
        Ok(connection)
    }
}

/// Broker side of one client connection.
pub struct FakeBrokerConnection {
    stream: TcpStream,
}

impl FakeBrokerConnection {
    /// Read one control packet: fixed header byte and body.
    pub async fn read_packet(&mut self) -> std::io::Result<(u8, Vec<u8>)> {
        let header = self.stream.read_u8().await?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.stream.read_u8().await?;
            len |= usize::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        Ok((header, body))
    }

    pub async fn connack(&mut self, code: u8) -> std::io::Result<()> {
        self.stream.write_all(&[0x20, 0x02, 0x00, code]).await
    }

    /// Wait for a SUBSCRIBE and return its packet id and first filter.
    pub async fn expect_subscribe(&mut self) -> std::io::Result<(u16, String)> {
        let (header, body) = self.read_packet().await?;
        if header != SUBSCRIBE || body.len() < 4 {
            return Err(std::io::Error::other(format!(
                "expected SUBSCRIBE, got {header:#04x}"
            )));
        }
        let pkid = u16::from_be_bytes([body[0], body[1]]);
        let len = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let filter = body
            .get(4..4 + len)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        Ok((pkid, filter))
    }

    pub async fn suback(&mut self, pkid: u16, code: u8) -> std::io::Result<()> {
        let [hi, lo] = pkid.to_be_bytes();
        self.stream.write_all(&[0x90, 0x03, hi, lo, code]).await
    }

    /// Send a QoS 0 publish.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> std::io::Result<()> {
        let len = 2 + topic.len() + payload.len();
        let mut packet = vec![PUBLISH];
        let mut remaining = len;
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        self.stream.write_all(&packet).await
    }

    /// Read packets until the client closes the socket, returning the
    /// fixed header byte of each one.
    pub async fn headers_until_closed(&mut self) -> Vec<u8> {
        let mut headers = Vec::new();
        while let Ok((header, _)) = self.read_packet().await {
            headers.push(header);
        }
        headers
    }

    /// Drop the connection without a DISCONNECT.
    pub fn close(self) {}
}
