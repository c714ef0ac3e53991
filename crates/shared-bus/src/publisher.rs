//! # Event Publisher
//!
//! The coordinator's side of the bus. Delivery is fire-and-forget: a
//! publish with no listener is not an error, and per-topic counters record
//! what was sent so a runtime can report activity without subscribing.

use crate::events::{EventFilter, EventTopic, SpvEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Sink for coordinator events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver `event` to current subscribers; returns how many received it.
    async fn publish(&self, event: SpvEvent) -> usize;
}

/// Broadcast-backed bus, one per coordinator.
///
/// Independent pools in one process each own a bus and never see each
/// other's events.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<SpvEvent>,
    chain_events: AtomicU64,
    health_events: AtomicU64,
}

impl InMemoryEventBus {
    /// Bus buffering [`DEFAULT_CHANNEL_CAPACITY`] events per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus buffering `capacity` events per subscriber before it lags.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            chain_events: AtomicU64::new(0),
            health_events: AtomicU64::new(0),
        }
    }

    /// Receive events passing `filter` from now on.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "Observer subscribed");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Like [`subscribe`](Self::subscribe), as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Live subscriptions.
    #[must_use]
    pub fn observers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events published on `topic` so far, listened to or not.
    #[must_use]
    pub fn published(&self, topic: EventTopic) -> u64 {
        self.counter(topic).load(Ordering::Relaxed)
    }

    fn counter(&self, topic: EventTopic) -> &AtomicU64 {
        match topic {
            EventTopic::Chain => &self.chain_events,
            EventTopic::ServerHealth => &self.health_events,
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: SpvEvent) -> usize {
        let topic = event.topic();
        self.counter(topic).fetch_add(1, Ordering::Relaxed);

        // Err only means nobody listens.
        let delivered = self.sender.send(event).unwrap_or(0);
        if delivered == 0 {
            trace!(?topic, "Event had no observers");
        } else {
            debug!(?topic, delivered, "Event published");
        }
        delivered
    }
}
