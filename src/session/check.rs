//! Relay reachability checks
//!
//! Connects to each platform's relay, measures how long the connection
//! took and hangs up without sending a key, so nothing is ever streamed.
//! Useful before going live to find relays that are down or misconfigured.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::platform::{Endpoint, Platform};
use crate::relay::RelayTransport;

use super::config::SessionConfig;

/// Outcome of checking one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCheck {
    /// Endpoint that was tried
    pub endpoint: Endpoint,
    /// Time to connect, or why the connection failed
    pub result: Result<Duration, RelayError>,
}

impl RelayCheck {
    pub fn is_reachable(&self) -> bool {
        self.result.is_ok()
    }
}

/// Check every platform's relay concurrently.
///
/// Endpoints and the connect timeout come from `config`.
pub async fn check_relays(
    config: &SessionConfig,
    transport: &dyn RelayTransport,
) -> HashMap<Platform, RelayCheck> {
    let checks = Platform::ALL.into_iter().map(|platform| async move {
        let endpoint = config.endpoint_for(platform);
        let result = check_relay(transport, &endpoint, config.channel.connect_timeout).await;

        match &result {
            Ok(elapsed) => tracing::info!(
                platform = %platform,
                endpoint = %endpoint,
                elapsed_ms = elapsed.as_millis() as u64,
                "Relay reachable"
            ),
            Err(e) => tracing::warn!(
                platform = %platform,
                endpoint = %endpoint,
                error = %e,
                "Relay unreachable"
            ),
        }

        (platform, RelayCheck { endpoint, result })
    });

    join_all(checks).await.into_iter().collect()
}

/// Connect to one relay and hang up again
pub async fn check_relay(
    transport: &dyn RelayTransport,
    endpoint: &Endpoint,
    connect_timeout: Option<Duration>,
) -> Result<Duration, RelayError> {
    let started = Instant::now();
    let connect = transport.connect(endpoint);

    let mut connection = match connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| RelayError::ConnectTimeout)??,
        None => connect.await?,
    };
    let elapsed = started.elapsed();

    connection.writer.shutdown().await;
    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::testing::{MockTransport, RelayBehavior};

    #[tokio::test(start_paused = true)]
    async fn test_reachable_relay_is_released_without_key() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("relay", 1);
        transport.set_behavior(
            &endpoint,
            RelayBehavior::default().connect_delay(Duration::from_millis(40)),
        );

        let elapsed = check_relay(&transport, &endpoint, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(elapsed, Duration::from_millis(40));
        assert_eq!(transport.connect_attempts(&endpoint), 1);
        assert!(transport.messages(&endpoint).is_empty());
        assert!(transport.all_released(&endpoint));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_relay() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("down", 1);
        transport.set_behavior(&endpoint, RelayBehavior::default().refuse());

        let result = check_relay(&transport, &endpoint, None).await;
        assert!(matches!(result, Err(RelayError::Connect(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_relay_times_out() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("slow", 1);
        transport.set_behavior(
            &endpoint,
            RelayBehavior::default().connect_delay(Duration::from_secs(30)),
        );

        let started = Instant::now();
        let result = check_relay(&transport, &endpoint, Some(Duration::from_secs(5))).await;

        assert_eq!(result, Err(RelayError::ConnectTimeout));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_relays_reports_every_platform() {
        let transport = MockTransport::new();
        let twitch = Endpoint::new("twitch-relay", 5000);
        transport.set_behavior(&twitch, RelayBehavior::default().refuse());
        transport.set_behavior(
            &Platform::Facebook.default_endpoint(),
            RelayBehavior::default().connect_delay(Duration::from_secs(30)),
        );

        let config = SessionConfig::default()
            .endpoint(Platform::Twitch, twitch.clone())
            .channel(ChannelConfig::default().connect_timeout(Duration::from_secs(5)));

        // Checks run concurrently, so the slow relay bounds the total
        let started = Instant::now();
        let results = check_relays(&config, &transport).await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));

        assert_eq!(results.len(), 3);
        assert!(results[&Platform::YouTube].is_reachable());
        assert_eq!(
            results[&Platform::YouTube].endpoint,
            Platform::YouTube.default_endpoint()
        );
        assert_eq!(results[&Platform::Twitch].endpoint, twitch);
        assert!(matches!(
            results[&Platform::Twitch].result,
            Err(RelayError::Connect(_))
        ));
        assert_eq!(
            results[&Platform::Facebook].result,
            Err(RelayError::ConnectTimeout)
        );
    }
}
