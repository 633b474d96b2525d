//! Long-lived broadcast tasks
//!
//! Three periodic loops back the real-time feed:
//! - full order-book snapshots for every symbol with a subscriber
//! - a latency heartbeat with a moving average of store round-trips
//! - a session sweep that closes clients past the ping timeout

use std::sync::Arc;
use std::time::Duration;

use book::OrderBook;
use store::MemoryStore;
use tracing::warn;
use types::ids::Symbol;
use types::order::Venue;
use types::time::now_nanos;

use crate::envelope::{self, Envelope, EventBody, Topic};
use crate::session::SessionRegistry;

const LATENCY_HISTORY: usize = 10;
const SNAPSHOT_DEPTH: usize = 10;

/// Broadcast lit-book snapshots for subscribed symbols every `period`.
pub async fn run_snapshot_broadcaster(
    store: Arc<MemoryStore>,
    book: Arc<OrderBook>,
    sessions: Arc<SessionRegistry>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        for channel in sessions.subscribed_channels() {
            let Some(Topic::Orderbook(symbol)) = Topic::parse(&channel) else {
                continue;
            };
            match book.depth(&symbol, Venue::Lit, SNAPSHOT_DEPTH) {
                Ok(depth) => {
                    let envelope = Envelope::new(
                        EventBody::Orderbook { symbol: symbol.clone(), data: depth },
                        now_nanos(),
                    );
                    if let Err(err) = envelope::publish(&store, &Topic::Orderbook(symbol), &envelope) {
                        warn!(error = %err, "Snapshot publish failed");
                    }
                }
                Err(err) => warn!(symbol = %symbol, error = %err, "Depth query failed"),
            }
        }
    }
}

/// Publish a `latency` heartbeat on the system topic every `period`.
///
/// The value is a moving average over the last ten store round-trips.
pub async fn run_latency_heartbeat(store: Arc<MemoryStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut history: Vec<f64> = Vec::with_capacity(LATENCY_HISTORY);
    loop {
        interval.tick().await;
        let rtt_ms = match store.ping() {
            Ok(rtt) => rtt.as_secs_f64() * 1_000.0,
            Err(err) => {
                warn!(error = %err, "Store ping failed");
                continue;
            }
        };
        history.push(rtt_ms);
        if history.len() > LATENCY_HISTORY {
            history.remove(0);
        }
        let average = history.iter().sum::<f64>() / history.len() as f64;
        let envelope = Envelope::new(
            EventBody::Latency { value_ms: (average * 1_000.0).round() / 1_000.0 },
            now_nanos(),
        );
        if let Err(err) = envelope::publish(&store, &Topic::System, &envelope) {
            warn!(error = %err, "Latency publish failed");
        }
    }
}

/// Close sessions that have been silent past the ping timeout.
pub async fn run_session_sweeper(sessions: Arc<SessionRegistry>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        sessions.sweep_stale(now_nanos());
    }
}

/// Symbols that currently have at least one order-book subscriber.
pub fn subscribed_symbols(sessions: &SessionRegistry) -> Vec<Symbol> {
    sessions
        .subscribed_channels()
        .iter()
        .filter_map(|channel| match Topic::parse(channel) {
            Some(Topic::Orderbook(symbol)) => Some(symbol),
            _ => None,
        })
        .collect()
}
