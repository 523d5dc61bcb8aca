//! Fan-out sessions
//!
//! A session takes the user's selected platforms, checks that every one of
//! them has a stream key, acquires the media device and opens one
//! [`DestinationChannel`](crate::channel::DestinationChannel) per platform.
//! Each captured chunk is then offered to every channel; channels that are
//! not ready, or that failed, drop it without affecting the others.

pub mod check;
pub mod config;
pub mod event;
pub mod fanout;
mod pump;
pub mod state;

pub use check::{check_relay, check_relays, RelayCheck};
pub use config::{RetryPolicy, SessionConfig};
pub use event::SessionEvent;
pub use fanout::FanoutSession;
pub use state::SessionState;
