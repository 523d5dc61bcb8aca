//! Session state machine
//!
//! ```text
//! Idle ──► Starting ──► Live ──► Stopping ──► Idle
//!             │                     ▲
//!             └── (error/cancel) ───┴──► Idle
//! ```

use std::fmt;

/// Lifecycle state of a fan-out session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No channels, media released
    Idle,
    /// Acquiring media and opening channels
    Starting,
    /// Media is flowing to the destination channels
    Live,
    /// Tearing down channels and media
    Stopping,
}

impl SessionState {
    /// Whether the session holds any resources
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Live => "live",
            SessionState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}
