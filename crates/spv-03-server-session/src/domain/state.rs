//! # Session Lifecycle

use serde::{Deserialize, Serialize};

/// `Connecting → Ready → Degraded → Closed`.
///
/// `Degraded` returns to `Ready` once the health cooldown elapses; `Closed`
/// is terminal for the session object (reconnects create a new session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Socket open, handshake in progress.
    Connecting,
    /// Handshake done, primary-eligible.
    Ready,
    /// Suspicion over threshold; usable but not primary-eligible.
    Degraded,
    /// Connection gone.
    Closed,
}

impl SessionState {
    /// True for states that can serve requests.
    pub fn is_usable(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Degraded)
    }
}
