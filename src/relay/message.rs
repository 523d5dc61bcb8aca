//! Relay protocol messages

use bytes::Bytes;

use crate::platform::StreamKey;

/// Frame type: client sends its stream key
pub const FRAME_SEND_KEY: u8 = 0x01;
/// Frame type: client sends one media chunk
pub const FRAME_BINARY_STREAM: u8 = 0x02;
/// Frame type: relay acknowledges the stream key
pub const FRAME_KEY_ACK: u8 = 0x81;
/// Frame type: relay reports an error
pub const FRAME_ERROR: u8 = 0x82;

/// Bytes in a frame header (type + length)
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default maximum payload size accepted by the codecs (8 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Largest payload the u32 length field can describe
pub const MAX_FRAME_SIZE_LIMIT: usize = u32::MAX as usize;

/// Messages sent from the client to a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// "send-key": must be the first message on a connection
    SendKey(StreamKey),
    /// "binarystream": one opaque media chunk
    BinaryStream(Bytes),
}

impl ClientMessage {
    /// Wire frame type
    pub fn frame_type(&self) -> u8 {
        match self {
            ClientMessage::SendKey(_) => FRAME_SEND_KEY,
            ClientMessage::BinaryStream(_) => FRAME_BINARY_STREAM,
        }
    }

    /// Whether this is the key handshake message
    pub fn is_key(&self) -> bool {
        matches!(self, ClientMessage::SendKey(_))
    }
}

/// Messages sent from a relay to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The relay accepted the stream key
    KeyAck,
    /// The relay rejected the stream or hit an error
    Error(String),
}

impl ServerMessage {
    /// Wire frame type
    pub fn frame_type(&self) -> u8 {
        match self {
            ServerMessage::KeyAck => FRAME_KEY_ACK,
            ServerMessage::Error(_) => FRAME_ERROR,
        }
    }
}
