//! Relay/ingest protocol
//!
//! Relays are external servers that accept one socket per destination and
//! forward the media onward over RTMP. The client side of the protocol is
//! deliberately small:
//!
//! ```text
//! Client                                   Relay
//!   |                                        |
//!   |------- send-key (stream key) -------->|
//!   |<------ key-ack (optional) ------------|
//!   |------- binarystream (chunk 0) ------->|
//!   |------- binarystream (chunk 1) ------->|
//!   |                 ...                    |
//! ```
//!
//! The key must be the first frame on every connection. Relays that do not
//! acknowledge keys are supported through the channel's ack policy.

pub mod codec;
pub mod message;
pub mod transport;

pub use codec::{ClientCodec, ServerCodec};
pub use message::{ClientMessage, ServerMessage};
pub use transport::{RelayConnection, RelayReader, RelayTransport, RelayWriter, TcpTransport};
