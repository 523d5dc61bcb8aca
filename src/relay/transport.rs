//! Relay transports
//!
//! A transport opens a bidirectional connection to a relay endpoint and
//! hands back independent write and read halves, so a channel can keep
//! sending media while it watches for acknowledgements or a remote close.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::RelayError;
use crate::platform::Endpoint;

use super::codec::ClientCodec;
use super::message::{ClientMessage, ServerMessage, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT};

/// Write half of a relay connection
#[async_trait]
pub trait RelayWriter: Send {
    /// Write one message and flush it
    async fn write(&mut self, msg: ClientMessage) -> Result<(), RelayError>;

    /// Close the write side. Errors are ignored.
    async fn shutdown(&mut self);
}

/// Read half of a relay connection
#[async_trait]
pub trait RelayReader: Send {
    /// Next message from the relay; `Ok(None)` once the relay closed the connection
    async fn read(&mut self) -> Result<Option<ServerMessage>, RelayError>;
}

/// An established relay connection
pub struct RelayConnection {
    pub writer: Box<dyn RelayWriter>,
    pub reader: Box<dyn RelayReader>,
}

impl fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConnection").finish_non_exhaustive()
    }
}

/// Opens connections to relay endpoints
#[async_trait]
pub trait RelayTransport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> Result<RelayConnection, RelayError>;
}

/// Plain TCP transport using the length-prefixed frame codec
#[derive(Debug, Clone)]
pub struct TcpTransport {
    nodelay: bool,
    max_frame_size: usize,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            nodelay: true, // chunks are small and latency-sensitive
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set the largest frame either side may send (at most `u32::MAX`)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.min(MAX_FRAME_SIZE_LIMIT);
        self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayTransport for TcpTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<RelayConnection, RelayError> {
        let socket = TcpStream::connect(endpoint.authority())
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        if self.nodelay {
            socket.set_nodelay(true)?;
        }

        tracing::debug!(endpoint = %endpoint, "Relay socket connected");

        let codec = ClientCodec::with_max_frame_size(self.max_frame_size);
        let (read_half, write_half) = socket.into_split();

        Ok(RelayConnection {
            writer: Box::new(TcpWriter {
                inner: FramedWrite::new(write_half, codec.clone()),
            }),
            reader: Box::new(TcpReader {
                inner: FramedRead::new(read_half, codec),
            }),
        })
    }
}

struct TcpWriter {
    inner: FramedWrite<OwnedWriteHalf, ClientCodec>,
}

struct TcpReader {
    inner: FramedRead<OwnedReadHalf, ClientCodec>,
}

#[async_trait]
impl RelayWriter for TcpWriter {
    async fn write(&mut self, msg: ClientMessage) -> Result<(), RelayError> {
        self.inner.send(msg).await
    }

    async fn shutdown(&mut self) {
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl RelayReader for TcpReader {
    async fn read(&mut self) -> Result<Option<ServerMessage>, RelayError> {
        self.inner.next().await.transpose()
    }
}
