//! Fan-out session configuration

use std::collections::HashMap;
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::platform::{Endpoint, Platform};

/// Reconnection policy for failed destinations
///
/// After the n-th consecutive failure of a destination the session waits
/// `initial_backoff * multiplier^(n-1)` (capped at `max_backoff`) and opens
/// a fresh channel, until `max_attempts` reconnects have been made. A
/// destination that reaches `Ready` starts counting from zero again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnects allowed per destination (0 = never reconnect)
    pub max_attempts: u32,
    /// Delay before the first reconnect
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Never reconnect; failed destinations stay failed
    pub fn disabled() -> Self {
        Self::exponential(0)
    }

    /// Exponential backoff from 500ms doubling up to 10s
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
        }
    }

    /// Set the first delay
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the delay cap
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set the growth factor (at least 1)
    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Whether any reconnect is allowed
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before reconnect number `attempt` (1-based), or `None` once the
    /// attempts are used up
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let factor = self.multiplier.max(1).saturating_pow(attempt - 1);
        let delay = self.initial_backoff.saturating_mul(factor);
        Some(delay.min(self.max_backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Session options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Options applied to every destination channel
    pub channel: ChannelConfig,

    /// Reconnection policy for failed destinations
    pub retry: RetryPolicy,

    /// Relay endpoint overrides; platforms not listed use their default
    pub endpoints: HashMap<Platform, Endpoint>,

    /// Buffered session events per subscriber
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            retry: RetryPolicy::default(),
            endpoints: HashMap::new(),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Set the channel options
    pub fn channel(mut self, config: ChannelConfig) -> Self {
        self.channel = config;
        self
    }

    /// Set the reconnection policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Route a platform to a specific relay
    pub fn endpoint(mut self, platform: Platform, endpoint: Endpoint) -> Self {
        self.endpoints.insert(platform, endpoint);
        self
    }

    /// Set the session event buffer size (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Relay endpoint for a platform
    pub fn endpoint_for(&self, platform: Platform) -> Endpoint {
        self.endpoints
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| platform.default_endpoint())
    }
}
