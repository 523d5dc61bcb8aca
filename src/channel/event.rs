//! Channel state events

use crate::error::RelayError;
use crate::platform::Platform;

use super::state::ChannelState;

/// A state transition of one destination channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    /// Destination platform
    pub platform: Platform,
    /// Unique id of the channel that changed
    pub channel_id: u64,
    /// Previous state
    pub from: ChannelState,
    /// New state
    pub to: ChannelState,
    /// Why the channel failed (set only when `to` is `Failed`)
    pub error: Option<RelayError>,
}

impl ChannelEvent {
    /// Whether this event reports a failure
    pub fn is_failure(&self) -> bool {
        self.to == ChannelState::Failed
    }
}
