//! Destination channel state machine
//!
//! ```text
//!  Connecting ──► KeySent ──► Ready ──► Closed
//!      │             │          │
//!      └─────────────┴──────────┴─────► Failed
//! ```
//!
//! `Closed` is reachable from every non-terminal state through `close()`.
//! `Closed` and `Failed` are terminal: no transition leaves them.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a destination channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelState {
    /// Connection attempt in flight
    Connecting,
    /// Connected, stream key written, waiting to become ready
    KeySent,
    /// Accepting media chunks
    Ready,
    /// Closed by the owner
    Closed,
    /// Connection failed or dropped
    Failed,
}

impl ChannelState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Failed)
    }

    /// Whether media may be sent in this state
    pub fn is_ready(&self) -> bool {
        *self == ChannelState::Ready
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: ChannelState) -> bool {
        use ChannelState::*;

        match (*self, next) {
            (Connecting, KeySent) | (KeySent, Ready) => true,
            (from, Closed | Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::KeySent => "key-sent",
            ChannelState::Ready => "ready",
            ChannelState::Closed => "closed",
            ChannelState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelState::*;
    use super::*;

    #[test]
    fn test_forward_path() {
        assert!(Connecting.can_transition_to(KeySent));
        assert!(KeySent.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Closed));
    }

    #[test]
    fn test_no_skipping_handshake() {
        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(KeySent));
        assert!(!KeySent.can_transition_to(Connecting));
    }

    #[test]
    fn test_failure_from_any_live_state() {
        for state in [Connecting, KeySent, Ready] {
            assert!(state.can_transition_to(Failed));
            assert!(state.can_transition_to(Closed));
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        for terminal in [Closed, Failed] {
            assert!(terminal.is_terminal());
            for next in [Connecting, KeySent, Ready, Closed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
