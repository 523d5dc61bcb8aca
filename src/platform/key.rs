//! Stream key newtype
//!
//! A stream key is the secret that tells a platform which channel an
//! incoming stream belongs to. It is only ever written in full to the relay
//! handshake and the key-management API; everywhere else (logs, `Debug`,
//! `Display`) it appears masked.

use std::fmt;

/// Number of characters left visible at each end of a masked key
const VISIBLE_CHARS: usize = 4;

/// Minimum number of mask characters in the middle of a masked key
const MIN_MASK_CHARS: usize = 8;

/// Opaque secret bound to (user, platform)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StreamKey(String);

impl StreamKey {
    /// Wrap a raw key. Surrounding whitespace is trimmed.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.len() == key.len() {
            Self(key)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The raw secret.
    ///
    /// Only the relay handshake and the key API client should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length of the key in characters
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Masked form for display: `abcd********wxyz`
    ///
    /// Keys too short to hide a meaningful middle are masked entirely.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let len = chars.len();

        if len <= VISIBLE_CHARS * 2 {
            return "*".repeat(len.max(MIN_MASK_CHARS));
        }

        let start: String = chars[..VISIBLE_CHARS].iter().collect();
        let end: String = chars[len - VISIBLE_CHARS..].iter().collect();
        let middle = "*".repeat(MIN_MASK_CHARS.max(len - VISIBLE_CHARS * 2));

        format!("{}{}{}", start, middle, end)
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<&str> for StreamKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StreamKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
