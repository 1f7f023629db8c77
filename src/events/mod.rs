//! # Notifications
//!
//! Typed lifecycle notifications consumed by dashboards and metrics exporters.
//! Delivery goes through a broadcast channel the caller subscribes to, so
//! ordering is per-publisher and slow subscribers lag rather than block.

pub mod publisher;
pub mod types;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
pub use types::SubstrateEvent;
