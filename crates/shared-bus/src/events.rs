//! # SPV Events
//!
//! Observable events emitted by the network coordinator.

use serde::{Deserialize, Serialize};
use shared_types::Hash256;

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpvEvent {
    /// The best chain gained a new tip.
    NewTip {
        /// Height of the new tip.
        height: u64,
        /// Hash of the new tip.
        hash: Hash256,
    },

    /// The best chain switched to a heavier branch.
    ///
    /// Any inclusion proof computed against a height above
    /// `common_ancestor_height` must be considered stale.
    Reorg {
        /// Height of the last header shared by the old and new chains.
        common_ancestor_height: u64,
        /// Tip of the chain that lost main status.
        old_tip: Hash256,
        /// Tip of the new main chain.
        new_tip: Hash256,
    },

    /// A server's trust score changed.
    ServerHealthChanged {
        /// Server in `host:port:t` form.
        endpoint: String,
        /// Current suspicion score (higher is worse).
        score: u32,
    },
}

impl SpvEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            SpvEvent::NewTip { .. } | SpvEvent::Reorg { .. } => EventTopic::Chain,
            SpvEvent::ServerHealthChanged { .. } => EventTopic::ServerHealth,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Tip and reorg events.
    Chain,
    /// Server trust changes.
    ServerHealth,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include (empty = all topics).
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &SpvEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
