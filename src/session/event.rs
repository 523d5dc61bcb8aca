//! Session events

use std::time::Duration;

use crate::channel::ChannelEvent;
use crate::error::MediaError;
use crate::platform::Platform;

/// Informational events published by a live session
///
/// Destination failures are reported here and never interrupt the
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A destination channel changed state
    Channel(ChannelEvent),

    /// A failed destination will be reopened after `delay`
    Reconnecting {
        platform: Platform,
        attempt: u32,
        delay: Duration,
    },

    /// A destination failed and has no reconnects left
    GaveUp { platform: Platform, attempts: u32 },

    /// The media source ended; the session has stopped
    MediaEnded,

    /// The media source failed; the session has stopped
    MediaFailed(MediaError),
}
