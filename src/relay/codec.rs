//! Relay frame codec
//!
//! Every message is a length-prefixed frame:
//!
//! ```text
//! +--------+----------------+------------------+
//! | type   | length         | payload          |
//! | 1 byte | 4 bytes (BE)   | `length` bytes   |
//! +--------+----------------+------------------+
//! ```
//!
//! [`ClientCodec`] is used by destination channels (encodes
//! [`ClientMessage`], decodes [`ServerMessage`]). [`ServerCodec`] is the
//! mirror image, used by relay implementations and tests.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RelayError;
use crate::platform::StreamKey;

use super::message::{
    ClientMessage, ServerMessage, DEFAULT_MAX_FRAME_SIZE, FRAME_BINARY_STREAM, FRAME_ERROR,
    FRAME_HEADER_SIZE, FRAME_KEY_ACK, FRAME_SEND_KEY, MAX_FRAME_SIZE_LIMIT,
};

/// Client side of the relay protocol
#[derive(Debug, Clone)]
pub struct ClientCodec {
    max_frame_size: usize,
}

/// Relay side of the relay protocol
#[derive(Debug, Clone)]
pub struct ServerCodec {
    max_frame_size: usize,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Limits above what the length field can carry are clamped
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE_LIMIT),
        }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Limits above what the length field can carry are clamped
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE_LIMIT),
        }
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Split one complete frame off the front of `src`.
///
/// Returns `None` until the whole frame has been buffered.
fn decode_frame(src: &mut BytesMut, max: usize) -> Result<Option<(u8, Bytes)>, RelayError> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let frame_type = src[0];
    let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

    if len > max {
        return Err(RelayError::FrameTooLarge { size: len, max });
    }

    if src.len() < FRAME_HEADER_SIZE + len {
        src.reserve(FRAME_HEADER_SIZE + len - src.len());
        return Ok(None);
    }

    src.advance(FRAME_HEADER_SIZE);
    let payload = src.split_to(len).freeze();
    Ok(Some((frame_type, payload)))
}

fn encode_frame(
    frame_type: u8,
    payload: &[u8],
    dst: &mut BytesMut,
    max: usize,
) -> Result<(), RelayError> {
    if payload.len() > max {
        return Err(RelayError::FrameTooLarge {
            size: payload.len(),
            max,
        });
    }

    let len = u32::try_from(payload.len()).map_err(|_| RelayError::FrameTooLarge {
        size: payload.len(),
        max,
    })?;

    dst.reserve(FRAME_HEADER_SIZE + payload.len());
    dst.put_u8(frame_type);
    dst.put_u32(len);
    dst.put_slice(payload);
    Ok(())
}

fn utf8(payload: Bytes, what: &str) -> Result<String, RelayError> {
    String::from_utf8(payload.to_vec())
        .map_err(|_| RelayError::Protocol(format!("{} is not valid UTF-8", what)))
}

impl Encoder<ClientMessage> for ClientCodec {
    type Error = RelayError;

    fn encode(&mut self, msg: ClientMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame_type = msg.frame_type();
        let payload: &[u8] = match &msg {
            ClientMessage::SendKey(key) => key.expose().as_bytes(),
            ClientMessage::BinaryStream(data) => data,
        };
        encode_frame(frame_type, payload, dst, self.max_frame_size)
    }
}

impl Decoder for ClientCodec {
    type Item = ServerMessage;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((frame_type, payload)) = decode_frame(src, self.max_frame_size)? else {
            return Ok(None);
        };

        match frame_type {
            FRAME_KEY_ACK => Ok(Some(ServerMessage::KeyAck)),
            FRAME_ERROR => Ok(Some(ServerMessage::Error(utf8(payload, "error message")?))),
            other => Err(RelayError::UnknownFrameType(other)),
        }
    }
}

impl Encoder<ServerMessage> for ServerCodec {
    type Error = RelayError;

    fn encode(&mut self, msg: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame_type = msg.frame_type();
        let payload: &[u8] = match &msg {
            ServerMessage::KeyAck => &[],
            ServerMessage::Error(message) => message.as_bytes(),
        };
        encode_frame(frame_type, payload, dst, self.max_frame_size)
    }
}

impl Decoder for ServerCodec {
    type Item = ClientMessage;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((frame_type, payload)) = decode_frame(src, self.max_frame_size)? else {
            return Ok(None);
        };

        match frame_type {
            FRAME_SEND_KEY => Ok(Some(ClientMessage::SendKey(StreamKey::new(utf8(
                payload,
                "stream key",
            )?)))),
            FRAME_BINARY_STREAM => Ok(Some(ClientMessage::BinaryStream(payload))),
            other => Err(RelayError::UnknownFrameType(other)),
        }
    }
}
