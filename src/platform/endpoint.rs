//! Relay endpoint addresses

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::ConfigError;

/// Address of a relay/ingest server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint from `host:port`, `tcp://host:port` or `http://host:port`
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let with_scheme = if s.contains("://") {
            s.to_string()
        } else {
            format!("tcp://{}", s)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|_| ConfigError::InvalidEndpoint(s.to_string()))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidEndpoint(s.to_string()))?;

        // Explicit port wins; otherwise fall back to the scheme's well-known port
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigError::InvalidEndpoint(s.to_string()))?;

        // Url keeps brackets around IPv6 hosts
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Self::new(host, port))
    }

    /// `host:port` form suitable for `TcpStream::connect`
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
