// connection.rs - TCP transport and the shared encode/decode buffer.
//
// One connection owns one pre-allocated buffer; layers write into it
// sequentially on send and the read loop appends into it until the
// outermost layer can tell how large the response frame is.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{EtherNetIpError, Result};
use crate::protocol::Protocol;

/// TCP connection to an EtherNet/IP device plus the session-scoped buffer.
///
/// Not safe for concurrent use: the buffer and the request/response pairing
/// assume one in-flight exchange at a time.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    capacity: usize,
    timeout: Duration,
}

impl Connection {
    /// Opens a TCP connection, bounded by `timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        buffer_size: usize,
        deadline: Duration,
    ) -> Result<Self> {
        debug!("connecting to {}:0x{:04X}", host, port);
        let stream = match timeout(deadline, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(EtherNetIpError::Io(e)),
            Err(_) => return Err(EtherNetIpError::Timeout(deadline)),
        };
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(buffer_size),
            capacity: buffer_size,
            timeout: deadline,
        })
    }

    /// Per-call deadline applied to every send and receive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the per-call deadline.
    pub fn set_timeout(&mut self, deadline: Duration) {
        self.timeout = deadline;
    }

    /// Encodes `layer` into the buffer and drains it to the socket.
    pub async fn write<P: Protocol>(&mut self, layer: &P) -> Result<()> {
        let size = layer.request_size();
        if size > self.capacity {
            return Err(EtherNetIpError::Argument(format!(
                "request of {} bytes exceeds the {}-byte buffer",
                size, self.capacity
            )));
        }
        self.buffer.clear();
        layer.encode(&mut self.buffer)?;
        trace!(
            "sending {} bytes: {:02X?}",
            self.buffer.len(),
            &self.buffer[..]
        );
        match timeout(self.timeout, self.stream.write_all(&self.buffer)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EtherNetIpError::Io(e)),
            Err(_) => Err(EtherNetIpError::Timeout(self.timeout)),
        }
    }

    /// Receives until `layer` reports the frame complete, then decodes it.
    pub async fn read<P: Protocol>(&mut self, layer: &mut P) -> Result<()> {
        self.buffer.clear();
        let deadline = Instant::now() + self.timeout;
        loop {
            let needed = layer.response_size(&self.buffer);
            if needed > self.capacity {
                return Err(EtherNetIpError::Framing(format!(
                    "response of {} bytes exceeds the {}-byte buffer",
                    needed, self.capacity
                )));
            }
            if self.buffer.len() >= needed {
                break;
            }
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(EtherNetIpError::Timeout(self.timeout))?;
            let read = match timeout(remaining, self.stream.read_buf(&mut self.buffer)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(EtherNetIpError::Io(e)),
                Err(_) => return Err(EtherNetIpError::Timeout(self.timeout)),
            };
            if read == 0 {
                return Err(EtherNetIpError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by device",
                )));
            }
        }
        trace!(
            "received {} bytes: {:02X?}",
            self.buffer.len(),
            &self.buffer[..]
        );
        let available = self.buffer.len();
        let mut bytes = Bytes::copy_from_slice(&self.buffer);
        layer.decode(&mut bytes, available)
    }

    /// One request/response exchange: write `layer`, then read into it.
    pub async fn execute<P: Protocol>(&mut self, layer: &mut P) -> Result<()> {
        self.write(&*layer).await?;
        self.read(layer).await
    }

    /// Shuts the stream down. Errors are ignored; the peer may already have
    /// dropped the connection after an unregister.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
