//! Key-management API seam

use std::fmt;

use async_trait::async_trait;

use crate::error::KeyError;
use crate::platform::{Platform, StreamKey};

/// Identity of the user whose keys are managed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Create a user id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(KeyError::InvalidUser);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend that stores stream keys per (user, platform)
#[async_trait]
pub trait KeyApi: Send + Sync + fmt::Debug {
    /// Fetch the key a user configured for a platform.
    ///
    /// Returns `Ok(None)` when the user has not configured one.
    async fn fetch_key(
        &self,
        user: &UserId,
        platform: Platform,
    ) -> Result<Option<StreamKey>, KeyError>;

    /// Store a key for a user and platform
    async fn store_key(
        &self,
        user: &UserId,
        platform: Platform,
        key: &StreamKey,
    ) -> Result<(), KeyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_empty() {
        assert_eq!(UserId::new("  "), Err(KeyError::InvalidUser));
        assert_eq!(UserId::new("42").unwrap().as_str(), "42");
    }
}
