//! Error types
//!
//! `Error` is the crate-wide error returned by fallible session and key store
//! operations. It is composed of focused enums so callers can match on the
//! class of failure:
//!
//! - [`ConfigError`]: bad input to `start()` or `save()`; correct and retry
//! - [`MediaError`]: the capture device could not be acquired or failed
//! - [`KeyError`]: the key-management API could not be reached or answered badly
//! - [`RelayError`]: a relay connection failed; only ever surfaces inside a
//!   channel's `Failed` event, never from `start()`

use std::io;

use thiserror::Error;

use crate::platform::Platform;
use crate::session::SessionState;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("key store error: {0}")]
    Key(#[from] KeyError),

    /// Operation not allowed in the session's current state
    #[error("session is {0}")]
    InvalidState(SessionState),

    /// `stop()` was called while `start()` was still acquiring resources
    #[error("start cancelled")]
    Cancelled,
}

/// Configuration errors, surfaced synchronously to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no platforms selected")]
    NoPlatformsSelected,

    #[error("no stream key configured for {}", join_platforms(.0))]
    MissingKeys(Vec<Platform>),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("invalid {platform} stream key: {reason}")]
    InvalidKey { platform: Platform, reason: String },

    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
}

/// Media capture errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Camera or microphone could not be opened
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    /// Capture failed after recording started
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Key-management API errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("user id must not be empty")]
    InvalidUser,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

impl From<reqwest::Error> for KeyError {
    fn from(e: reqwest::Error) -> Self {
        KeyError::Transport(e.to_string())
    }
}

/// Relay connection errors
///
/// Cloneable so the same failure can be stored in the channel and sent in
/// its state event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("connection closed by relay")]
    RemoteClosed,

    #[error("relay reported error: {0}")]
    Remote(String),
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Io(e.to_string())
    }
}

fn join_platforms(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(", ")
}
