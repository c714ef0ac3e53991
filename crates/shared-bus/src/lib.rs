//! # Shared Bus - Event Bus for SPV Engine Observers
//!
//! The network coordinator publishes chain and server-health events here.
//! Observers (UI, logging, the wallet synchronizer) subscribe without taking
//! part in the trust computation itself.
//!
//! ```text
//! ┌──────────────────────┐                    ┌──────────────┐
//! │ NetworkCoordinator   │    publish()       │  Observer    │
//! │                      │ ──────┐            │              │
//! └──────────────────────┘       │            └──────────────┘
//!                                ▼                    ↑
//!                          ┌──────────────┐          │
//!                          │  Event Bus   │ ─────────┘
//!                          └──────────────┘  subscribe()
//! ```
//!
//! Slow subscribers lag and skip events rather than applying backpressure
//! to the publisher.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, SpvEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
