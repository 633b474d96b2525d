//! Session registry
//!
//! Tracks each connected client's subscription set, outbound queue, and
//! liveness. Subscription and unsubscription are idempotent. A session
//! that sends nothing (not even a ping) within the timeout is closed by
//! the periodic sweep. On disconnect its subscriptions vanish with it;
//! reconnection is a fresh session.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::queue::{ClientQueue, EnqueueOutcome, MessageClass};

pub type SessionId = u64;

/// Session-layer tuning knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Snapshot lane capacity per client.
    pub snapshot_queue_capacity: usize,
    /// Critical lane capacity per client (overflow disconnects).
    pub critical_queue_capacity: usize,
    /// Close sessions silent for longer than this (nanos).
    pub ping_timeout_nanos: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_queue_capacity: 256,
            critical_queue_capacity: 65_536,
            ping_timeout_nanos: 30 * 1_000_000_000,
        }
    }
}

/// One connected client
#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    subscriptions: Mutex<BTreeSet<String>>,
    queue: Mutex<ClientQueue>,
    /// Woken whenever the queue gains messages or the session closes.
    pub notify: Notify,
    last_seen: AtomicI64,
    closed: AtomicBool,
    pub connected_at: i64,
}

impl SessionState {
    fn new(id: SessionId, config: &SessionConfig, timestamp: i64) -> Self {
        Self {
            id,
            subscriptions: Mutex::new(BTreeSet::new()),
            queue: Mutex::new(ClientQueue::new(
                config.snapshot_queue_capacity,
                config.critical_queue_capacity,
            )),
            notify: Notify::new(),
            last_seen: AtomicI64::new(timestamp),
            closed: AtomicBool::new(false),
            connected_at: timestamp,
        }
    }

    fn lock_subs(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, ClientQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.lock_subs().contains(channel)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock_subs().iter().cloned().collect()
    }

    /// Record inbound activity (any frame counts as liveness).
    pub fn touch(&self, timestamp: i64) {
        self.last_seen.store(timestamp, Ordering::SeqCst);
    }

    pub fn is_stale(&self, now: i64, timeout_nanos: i64) -> bool {
        now - self.last_seen.load(Ordering::SeqCst) > timeout_nanos
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the session closed and wake its writer task.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Queue a payload directly to this session (acks, pongs, errors).
    pub fn send_direct(&self, payload: String) {
        self.lock_queue().enqueue(MessageClass::Critical, payload);
        self.notify.notify_one();
    }

    /// Take everything queued for delivery.
    pub fn drain(&self) -> Vec<String> {
        self.lock_queue().drain()
    }
}

/// Registry of all live sessions
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionState>>,
    next_id: AtomicU64,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Register a fresh session.
    pub fn register(&self, timestamp: i64) -> Arc<SessionState> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(SessionState::new(id, &self.config, timestamp));
        self.sessions.insert(id, session.clone());
        info!(session_id = id, "Session connected");
        session
    }

    /// Remove a session; its subscriptions die with it.
    pub fn disconnect(&self, id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            session.close();
            info!(session_id = id, "Session disconnected");
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionState>> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Subscribe a session to a channel. Returns false if it was already
    /// subscribed (idempotent).
    pub fn subscribe(&self, id: SessionId, channel: &str) -> bool {
        match self.get(id) {
            Some(session) => session.lock_subs().insert(channel.to_string()),
            None => false,
        }
    }

    /// Unsubscribe a session from a channel. Idempotent.
    pub fn unsubscribe(&self, id: SessionId, channel: &str) -> bool {
        match self.get(id) {
            Some(session) => session.lock_subs().remove(channel),
            None => false,
        }
    }

    /// Whether any session is subscribed to the channel.
    pub fn has_subscribers(&self, channel: &str) -> bool {
        self.sessions.iter().any(|s| s.is_subscribed(channel))
    }

    /// Channels with at least one subscriber, deduplicated.
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .sessions
            .iter()
            .flat_map(|s| s.subscriptions())
            .collect();
        channels.sort();
        channels.dedup();
        channels
    }

    /// Fan a payload out to every session subscribed to the channel.
    /// Sessions whose critical lane overflows are disconnected.
    pub fn route(&self, channel: &str, class: MessageClass, payload: &str) {
        let mut to_disconnect = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            if !session.is_subscribed(channel) {
                continue;
            }
            let outcome = session.lock_queue().enqueue(class, payload.to_string());
            match outcome {
                EnqueueOutcome::Queued | EnqueueOutcome::DroppedOldest => {
                    session.notify.notify_one();
                }
                EnqueueOutcome::Disconnect => {
                    warn!(session_id = session.id, channel, "Critical queue overflow, disconnecting client");
                    to_disconnect.push(session.id);
                }
            }
        }
        for id in to_disconnect {
            self.disconnect(id);
        }
    }

    /// Close and remove sessions silent past the ping timeout.
    pub fn sweep_stale(&self, now: i64) -> Vec<SessionId> {
        let timeout = self.config.ping_timeout_nanos;
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.is_stale(now, timeout))
            .map(|s| s.id)
            .collect();
        for id in &stale {
            debug!(session_id = id, "Closing stale session");
            self.disconnect(*id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionConfig::default())
    }

    #[test]
    fn test_register_and_disconnect() {
        let reg = registry();
        let session = reg.register(0);
        assert_eq!(reg.session_count(), 1);

        reg.disconnect(session.id);
        assert_eq!(reg.session_count(), 0);
        assert!(session.is_closed());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let reg = registry();
        let session = reg.register(0);

        assert!(reg.subscribe(session.id, "trades:AAPL"));
        assert!(!reg.subscribe(session.id, "trades:AAPL"), "second subscribe is a no-op");
        assert_eq!(session.subscriptions(), vec!["trades:AAPL"]);

        assert!(reg.unsubscribe(session.id, "trades:AAPL"));
        assert!(!reg.unsubscribe(session.id, "trades:AAPL"));
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_route_only_reaches_subscribers() {
        let reg = registry();
        let subscribed = reg.register(0);
        let other = reg.register(0);
        reg.subscribe(subscribed.id, "notifications");

        reg.route("notifications", MessageClass::Critical, "hello");

        assert_eq!(subscribed.drain(), vec!["hello"]);
        assert!(other.drain().is_empty());
    }

    #[test]
    fn test_route_disconnects_on_critical_overflow() {
        let reg = SessionRegistry::new(SessionConfig {
            critical_queue_capacity: 2,
            ..SessionConfig::default()
        });
        let session = reg.register(0);
        reg.subscribe(session.id, "trades:AAPL");

        for i in 0..3 {
            reg.route("trades:AAPL", MessageClass::Critical, &format!("t{i}"));
        }
        assert_eq!(reg.session_count(), 0, "overflowing client removed");
        assert!(session.is_closed());
    }

    #[test]
    fn test_stale_sweep() {
        let reg = SessionRegistry::new(SessionConfig {
            ping_timeout_nanos: 10,
            ..SessionConfig::default()
        });
        let stale = reg.register(0);
        let fresh = reg.register(0);
        fresh.touch(100);

        let swept = reg.sweep_stale(100);
        assert_eq!(swept, vec![stale.id]);
        assert_eq!(reg.session_count(), 1);
    }

    #[test]
    fn test_subscribed_channels_dedup() {
        let reg = registry();
        let a = reg.register(0);
        let b = reg.register(0);
        reg.subscribe(a.id, "orderbook:AAPL");
        reg.subscribe(b.id, "orderbook:AAPL");
        reg.subscribe(b.id, "system");

        assert_eq!(reg.subscribed_channels(), vec!["orderbook:AAPL", "system"]);
        assert!(reg.has_subscribers("orderbook:AAPL"));
        assert!(!reg.has_subscribers("orderbook:MSFT"));
    }
}
