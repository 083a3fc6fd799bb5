//! Device transport framing.
//!
//! The device writes bare JSON objects with no delimiter. Each read takes
//! at most one [`READ_CHUNK_SIZE`] chunk and decodes it as a single
//! envelope; two objects landing in the same chunk fail to decode.

use dmiot_protocol::{DeviceMessage, Outbound, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionResult;

pub const READ_CHUNK_SIZE: usize = 1024;

/// Result of one read from the device.
#[derive(Debug)]
pub enum Frame {
    Message(DeviceMessage),
    /// The chunk was not a valid envelope.
    Malformed(ProtocolError),
    /// End of stream.
    Closed,
}

/// Stream connected to one device.
pub struct DeviceTransport<S> {
    stream: S,
}

impl<S> DeviceTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read and decode the next chunk.
    ///
    /// Cancel-safe: if the future is dropped before completing, no bytes
    /// have been consumed from the stream.
    pub async fn read_frame(&mut self) -> std::io::Result<Frame> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(Frame::Closed);
        }

        tracing::trace!(payload = %String::from_utf8_lossy(&buf[..n]), "received from device");
        Ok(match DeviceMessage::decode(&buf[..n]) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Malformed(e),
        })
    }

    /// Write one message and wait until it is flushed.
    pub async fn send(&mut self, message: impl Into<Outbound>) -> SessionResult<()> {
        let bytes = message.into().encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        tracing::debug!(payload = %String::from_utf8_lossy(&bytes), "sent to device");
        Ok(())
    }

    /// Close the write side of the stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }
}
