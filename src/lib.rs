//! Multi-destination live stream fan-out
//!
//! `multistream` captures one local media stream and forwards it to several
//! streaming platforms at once. Each platform is reached through a relay
//! that accepts a socket, reads the platform's stream key as the first
//! frame and pushes everything after it onward over RTMP.
//!
//! The crate is built from three pieces:
//!
//! - [`StreamKeyStore`]: per-user stream keys fetched from the key service
//!   and cached for the session
//! - [`DestinationChannel`]: one relay connection, with its own state
//!   machine `Connecting → KeySent → Ready → Closed` (or `Failed`)
//! - [`FanoutSession`]: validates the selection, acquires the capture
//!   device, opens one channel per platform and offers every chunk to all
//!   of them
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use multistream::{
//!     FanoutSession, HttpKeyApi, Platform, StreamKeyStore, SyntheticDevice, TcpTransport, UserId,
//! };
//!
//! # async fn run() -> multistream::Result<()> {
//! let keys = Arc::new(StreamKeyStore::new(Arc::new(HttpKeyApi::new()?)));
//! keys.refresh(&UserId::new("user-42")?).await?;
//!
//! let session = FanoutSession::new(
//!     keys,
//!     Arc::new(SyntheticDevice::default()),
//!     Arc::new(TcpTransport::new()),
//! );
//! session.start([Platform::YouTube, Platform::Twitch]).await?;
//! // ...
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod keys;
pub mod media;
pub mod platform;
pub mod relay;
pub mod session;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{AckPolicy, ChannelConfig, ChannelEvent, ChannelState, DestinationChannel};
pub use error::{ConfigError, Error, KeyError, MediaError, RelayError, Result};
pub use keys::{HttpKeyApi, KeyApi, KeyApiConfig, KeySnapshot, StreamKeyStore, UserId};
pub use media::{MediaCapture, MediaChunk, MediaDevice, MediaSource, ReaderDevice, SyntheticDevice};
pub use platform::{Endpoint, Platform, StreamKey};
pub use relay::{RelayTransport, TcpTransport};
pub use session::{
    check_relays, FanoutSession, RelayCheck, RetryPolicy, SessionConfig, SessionEvent,
    SessionState,
};
pub use stats::{ChannelStats, DestinationStats, SessionStats};
