//! Destination channel configuration

use std::time::Duration;

/// When a channel that has sent its key starts accepting media
///
/// Defaults to [`Immediate`](AckPolicy::Immediate), which suits relays
/// that never acknowledge. Use `AwaitAck` for relays that do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Ready as soon as the key is written
    #[default]
    Immediate,
    /// Ready when the relay acknowledges the key, or after `timeout`
    /// without an acknowledgement.
    AwaitAck { timeout: Duration },
}

/// Per-channel options
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Time allowed for the connection to be established (None = no limit)
    pub connect_timeout: Option<Duration>,

    /// Readiness rule after the key handshake
    pub ack_policy: AckPolicy,

    /// Chunks buffered between fan-out and the socket writer.
    /// When full, further chunks are dropped for this destination.
    pub send_queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            ack_policy: AckPolicy::default(),
            send_queue_capacity: 256,
        }
    }
}

impl ChannelConfig {
    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely for connections
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Set the ack policy
    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Set the send queue capacity (at least 1)
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self
    }
}
