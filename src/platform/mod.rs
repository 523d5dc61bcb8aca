//! Streaming platforms
//!
//! The set of destinations is closed: each [`Platform`] variant knows its
//! display name, its key-management API slug, the default relay endpoint
//! that forwards to it, its RTMP ingest URL and the rule its stream keys
//! must satisfy.

pub mod endpoint;
pub mod key;

pub use endpoint::Endpoint;
pub use key::StreamKey;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A streaming platform that can be selected as a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Twitch,
    Facebook,
}

impl Platform {
    /// Every supported platform, in display order
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Twitch, Platform::Facebook];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Twitch => "Twitch",
            Platform::Facebook => "Facebook",
        }
    }

    /// Path segment and JSON field prefix used by the key-management API
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Twitch => "twitch",
            Platform::Facebook => "facebook",
        }
    }

    /// JSON field carrying this platform's key (`youtubeKey`, ...)
    pub fn key_field(&self) -> String {
        format!("{}Key", self.slug())
    }

    /// Relay server that forwards to this platform when none is configured
    pub fn default_endpoint(&self) -> Endpoint {
        match self {
            Platform::YouTube => Endpoint::new("localhost", 3000),
            Platform::Twitch => Endpoint::new("localhost", 5000),
            Platform::Facebook => Endpoint::new("localhost", 6001),
        }
    }

    /// RTMP ingest base URL the relay publishes to
    pub fn rtmp_base_url(&self) -> &'static str {
        match self {
            Platform::YouTube => "rtmp://a.rtmp.youtube.com/live2/",
            Platform::Twitch => "rtmp://live.twitch.tv/live/",
            Platform::Facebook => "rtmps://live-api-s.facebook.com:443/rtmp/",
        }
    }

    /// Full ingest URL for a key
    pub fn ingest_url(&self, key: &StreamKey) -> String {
        format!("{}{}", self.rtmp_base_url(), key.expose())
    }

    /// Check a raw key against this platform's format rule
    pub fn validate_key(&self, key: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        let len = key.chars().count();

        let reason = if key.is_empty() {
            Some("stream key cannot be empty")
        } else {
            match self {
                Platform::YouTube if !(20..=50).contains(&len) => {
                    Some("YouTube stream key should be 20-50 characters")
                }
                Platform::Twitch if !key.starts_with("live_") && len < 30 => {
                    Some("invalid Twitch stream key format")
                }
                Platform::Facebook if len < 30 => {
                    Some("Facebook stream key appears to be too short")
                }
                _ => None,
            }
        };

        match reason {
            Some(reason) => Err(ConfigError::InvalidKey {
                platform: *self,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.slug().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownPlatform(s.to_string()))
    }
}
