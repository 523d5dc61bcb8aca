//! Statistics for destination channels and fan-out sessions

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::channel::ChannelState;
use crate::platform::Platform;

/// Live counters shared between a channel handle and its connection task
#[derive(Debug, Default)]
pub struct ChannelCounters {
    chunks_offered: AtomicU64,
    chunks_sent: AtomicU64,
    chunks_skipped: AtomicU64,
    chunks_dropped: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ChannelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_offered(&self) {
        self.chunks_offered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, bytes: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.chunks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            chunks_offered: self.chunks_offered.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Channel-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Chunks handed to the channel by fan-out
    pub chunks_offered: u64,
    /// Chunks written to the relay socket
    pub chunks_sent: u64,
    /// Chunks ignored because the channel was not ready
    pub chunks_skipped: u64,
    /// Chunks dropped because the send queue was full or the connection gone
    pub chunks_dropped: u64,
    /// Payload bytes written to the relay socket
    pub bytes_sent: u64,
}

impl ChannelStats {
    /// Fraction of offered chunks that were written, in `[0, 1]`
    pub fn delivery_ratio(&self) -> f64 {
        if self.chunks_offered == 0 {
            0.0
        } else {
            self.chunks_sent as f64 / self.chunks_offered as f64
        }
    }
}

/// Per-destination entry in [`SessionStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DestinationStats {
    /// Current channel state
    pub state: ChannelState,
    /// Reconnect attempts made for this destination
    pub reconnects: u32,
    /// Counters of the current channel
    pub channel: ChannelStats,
}

/// Session-level statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    /// Chunks produced by the capture
    pub chunks_produced: u64,
    /// Payload bytes produced by the capture
    pub bytes_produced: u64,
    /// Time since the session went live
    pub duration: Duration,
    /// Per-destination statistics
    pub destinations: HashMap<Platform, DestinationStats>,
}

impl SessionStats {
    /// Capture bitrate estimate (bits/sec)
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_produced * 8) / secs
        } else {
            0
        }
    }

    /// Number of destinations currently accepting media
    pub fn ready_destinations(&self) -> usize {
        self.destinations
            .values()
            .filter(|d| d.state.is_ready())
            .count()
    }
}
