//! Stream key store
//!
//! A read-mostly cache of the current user's stream keys. `refresh` fetches
//! every platform concurrently and swaps the whole cache at once; `get` is a
//! pure in-memory lookup that the session uses when it opens channels.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::join_all;

use crate::error::{KeyError, Result};
use crate::platform::{Platform, StreamKey};

use super::api::{KeyApi, UserId};

/// Outcome of a refresh
///
/// A platform appears in at most one of `keys` and `failures`; platforms
/// in neither are simply not configured.
#[derive(Debug, Clone, Default)]
pub struct KeySnapshot {
    keys: HashMap<Platform, StreamKey>,
    failures: HashMap<Platform, KeyError>,
}

impl KeySnapshot {
    /// Keys that were found
    pub fn keys(&self) -> &HashMap<Platform, StreamKey> {
        &self.keys
    }

    /// Platforms whose fetch failed, with the reason
    pub fn failures(&self) -> &HashMap<Platform, KeyError> {
        &self.failures
    }

    /// Platforms with a key, in display order
    pub fn configured(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.keys.contains_key(p))
            .collect()
    }
}

/// Per-session cache of destination credentials
#[derive(Debug)]
pub struct StreamKeyStore {
    api: Arc<dyn KeyApi>,
    cache: RwLock<Arc<HashMap<Platform, StreamKey>>>,
}

impl StreamKeyStore {
    /// Create an empty store backed by `api`
    pub fn new(api: Arc<dyn KeyApi>) -> Self {
        Self {
            api,
            cache: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Create a store pre-filled with keys, e.g. from a local config file
    pub fn with_keys(api: Arc<dyn KeyApi>, keys: HashMap<Platform, StreamKey>) -> Self {
        Self {
            api,
            cache: RwLock::new(Arc::new(keys)),
        }
    }

    /// Fetch all platforms' keys for `user` and replace the cache.
    ///
    /// One request per platform, run concurrently. A failed request only
    /// makes that platform unavailable; the rest of the snapshot is still
    /// cached.
    pub async fn refresh(&self, user: &UserId) -> Result<KeySnapshot> {
        let fetches = Platform::ALL.into_iter().map(|platform| {
            let api = Arc::clone(&self.api);
            async move { (platform, api.fetch_key(user, platform).await) }
        });

        let mut snapshot = KeySnapshot::default();
        for (platform, result) in join_all(fetches).await {
            match result {
                Ok(Some(key)) => {
                    snapshot.keys.insert(platform, key);
                }
                Ok(None) => {
                    tracing::debug!(platform = %platform, "No stream key configured");
                }
                Err(e) => {
                    tracing::warn!(platform = %platform, error = %e, "Failed to fetch stream key");
                    snapshot.failures.insert(platform, e);
                }
            }
        }

        self.replace(snapshot.keys.clone());

        tracing::info!(
            user = %user,
            configured = snapshot.keys.len(),
            failed = snapshot.failures.len(),
            "Stream keys refreshed"
        );

        Ok(snapshot)
    }

    /// Cached key for a platform
    pub fn get(&self, platform: Platform) -> Option<StreamKey> {
        self.current().get(&platform).cloned()
    }

    /// Platforms with a cached key, in display order
    pub fn configured(&self) -> Vec<Platform> {
        let cache = self.current();
        Platform::ALL
            .into_iter()
            .filter(|p| cache.contains_key(p))
            .collect()
    }

    /// Copy of the whole cache
    pub fn snapshot(&self) -> HashMap<Platform, StreamKey> {
        self.current().as_ref().clone()
    }

    /// Validate and store a key for `user`, then cache it
    pub async fn save(&self, user: &UserId, platform: Platform, key: StreamKey) -> Result<()> {
        platform.validate_key(key.expose())?;
        self.api.store_key(user, platform, &key).await?;

        let mut keys = self.snapshot();
        keys.insert(platform, key);
        self.replace(keys);

        tracing::info!(platform = %platform, user = %user, "Stream key saved");
        Ok(())
    }

    fn current(&self) -> Arc<HashMap<Platform, StreamKey>> {
        match self.cache.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace(&self, keys: HashMap<Platform, StreamKey>) {
        let keys = Arc::new(keys);
        match self.cache.write() {
            Ok(mut guard) => *guard = keys,
            Err(poisoned) => *poisoned.into_inner() = keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use crate::testing::MockKeyApi;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let api = MockKeyApi::new()
            .with_key(Platform::YouTube, "yt-key-0123456789-abcdef")
            .with_key(Platform::Twitch, "live_0123456789");
        let store = StreamKeyStore::new(Arc::new(api));

        assert!(store.get(Platform::YouTube).is_none());

        let snapshot = store.refresh(&user()).await.unwrap();
        assert_eq!(snapshot.configured(), vec![Platform::YouTube, Platform::Twitch]);
        assert!(snapshot.failures().is_empty());

        assert_eq!(
            store.get(Platform::Twitch).unwrap().expose(),
            "live_0123456789"
        );
        assert!(store.get(Platform::Facebook).is_none());
        assert_eq!(store.configured(), vec![Platform::YouTube, Platform::Twitch]);
    }

    #[tokio::test]
    async fn test_refresh_isolates_platform_failures() {
        let api = MockKeyApi::new()
            .with_key(Platform::YouTube, "yt-key-0123456789-abcdef")
            .with_failure(Platform::Twitch, KeyError::Transport("timeout".into()))
            .with_key(Platform::Facebook, "fb-key-0123456789-0123456789-abc");
        let store = StreamKeyStore::new(Arc::new(api));

        let snapshot = store.refresh(&user()).await.unwrap();

        assert_eq!(
            snapshot.configured(),
            vec![Platform::YouTube, Platform::Facebook]
        );
        assert!(matches!(
            snapshot.failures().get(&Platform::Twitch),
            Some(KeyError::Transport(_))
        ));
        assert!(store.get(Platform::Twitch).is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_cache() {
        let api = Arc::new(MockKeyApi::new().with_key(Platform::YouTube, "yt-key-0123456789-abcdef"));
        let store = StreamKeyStore::with_keys(
            api,
            HashMap::from([(Platform::Facebook, StreamKey::new("stale"))]),
        );
        assert!(store.get(Platform::Facebook).is_some());

        store.refresh(&user()).await.unwrap();

        assert!(store.get(Platform::Facebook).is_none());
        assert!(store.get(Platform::YouTube).is_some());
    }

    #[tokio::test]
    async fn test_save_validates_and_caches() {
        let api = Arc::new(MockKeyApi::new());
        let store = StreamKeyStore::new(api.clone());

        let result = store
            .save(&user(), Platform::Facebook, StreamKey::new("short"))
            .await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidKey {
                platform: Platform::Facebook,
                ..
            }))
        ));
        assert!(api.stored().is_empty());

        store
            .save(&user(), Platform::Twitch, StreamKey::new("live_abcdef"))
            .await
            .unwrap();
        assert_eq!(store.get(Platform::Twitch).unwrap().expose(), "live_abcdef");
        assert_eq!(api.stored().len(), 1);
    }

    #[tokio::test]
    async fn test_save_api_failure_leaves_cache() {
        let api = Arc::new(MockKeyApi::new().fail_stores(KeyError::Status {
            status: 401,
            message: "unauthorized".into(),
        }));
        let store = StreamKeyStore::new(api);

        let result = store
            .save(&user(), Platform::Twitch, StreamKey::new("live_abcdef"))
            .await;
        assert!(matches!(result, Err(Error::Key(KeyError::Status { status: 401, .. }))));
        assert!(store.get(Platform::Twitch).is_none());
    }
}
