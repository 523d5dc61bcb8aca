//! HTTP key-management client
//!
//! ```text
//! GET  {base}/keys/{slug}?userId=ID        -> { "{slug}Key": "..." }
//! POST {base}/keys/{slug}  { "userId", "{slug}Key" } -> 200
//! ```
//!
//! Error responses carry a human-readable `error` or `message` field.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use url::Url;

use crate::error::KeyError;
use crate::platform::{Platform, StreamKey};

use super::api::{KeyApi, UserId};

/// Production backend
pub const DEFAULT_API_BASE_URL: &str = "https://multi-streaming-platform-backend.vercel.app";

/// Key API client options
#[derive(Debug, Clone)]
pub struct KeyApiConfig {
    /// Base URL of the key-management service
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for KeyApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl KeyApiConfig {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// reqwest-backed [`KeyApi`]
#[derive(Debug, Clone)]
pub struct HttpKeyApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpKeyApi {
    /// Client for the production backend
    pub fn new() -> Result<Self, KeyError> {
        Self::with_config(KeyApiConfig::default())
    }

    pub fn with_config(config: KeyApiConfig) -> Result<Self, KeyError> {
        // Joining relative paths needs a trailing slash on the base
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| KeyError::InvalidBaseUrl(format!("{}: {}", base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    fn key_url(&self, platform: Platform) -> Result<Url, KeyError> {
        self.base_url
            .join(&format!("keys/{}", platform.slug()))
            .map_err(|e| KeyError::InvalidBaseUrl(e.to_string()))
    }
}

/// Turn a non-success response into a `KeyError::Status`
async fn status_error(response: reqwest::Response) -> KeyError {
    let status = response.status();
    let message = response
        .json::<Map<String, Value>>()
        .await
        .ok()
        .and_then(|body| {
            ["error", "message"]
                .iter()
                .find_map(|field| body.get(*field).and_then(Value::as_str).map(String::from))
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    KeyError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl KeyApi for HttpKeyApi {
    async fn fetch_key(
        &self,
        user: &UserId,
        platform: Platform,
    ) -> Result<Option<StreamKey>, KeyError> {
        let response = self
            .client
            .get(self.key_url(platform)?)
            .query(&[("userId", user.as_str())])
            .send()
            .await?;

        // The backend answers 404 for users without a key
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| KeyError::InvalidResponse(e.to_string()))?;

        match body.get(&platform.key_field()) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(key)) if key.trim().is_empty() => Ok(None),
            Some(Value::String(key)) => Ok(Some(StreamKey::new(key.as_str()))),
            Some(other) => Err(KeyError::InvalidResponse(format!(
                "{} is not a string: {}",
                platform.key_field(),
                other
            ))),
        }
    }

    async fn store_key(
        &self,
        user: &UserId,
        platform: Platform,
        key: &StreamKey,
    ) -> Result<(), KeyError> {
        let mut body = Map::new();
        body.insert("userId".into(), json!(user.as_str()));
        body.insert(platform.key_field(), json!(key.expose()));

        let response = self
            .client
            .post(self.key_url(platform)?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        tracing::debug!(platform = %platform, user = %user, "Stream key stored");
        Ok(())
    }
}
