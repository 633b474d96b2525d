//! Event fanout and session layer
//!
//! Publishes order-book snapshots, trade executions, and notifications
//! to subscribed clients over topic channels, with per-client bounded
//! queues so a slow consumer never stalls a publisher.
//!
//! # Modules
//! - `envelope`: topics and wire envelopes
//! - `queue`: per-client two-lane outbound queue
//! - `session`: session registry, subscriptions, ping timeout
//! - `bus`: store-channel → session-queue routing
//! - `broadcast`: snapshot, latency, and sweep background tasks

pub mod broadcast;
pub mod bus;
pub mod envelope;
pub mod queue;
pub mod session;

pub use bus::EventBus;
pub use envelope::{Envelope, EventBody, Toast, Topic};
pub use queue::{ClientQueue, EnqueueOutcome, MessageClass};
pub use session::{SessionConfig, SessionId, SessionRegistry, SessionState};
