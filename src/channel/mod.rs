//! Destination channels
//!
//! One channel per selected platform per session. A channel connects to
//! its relay, sends the stream key as the first frame, becomes ready and
//! then carries media until it is closed or fails. Channels fail
//! independently; a failing destination never affects its siblings.

pub mod config;
pub mod destination;
pub mod event;
pub mod state;

pub use config::{AckPolicy, ChannelConfig};
pub use destination::DestinationChannel;
pub use event::ChannelEvent;
pub use state::ChannelState;
