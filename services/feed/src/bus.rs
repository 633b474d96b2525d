//! Event bus
//!
//! Routes the store's pub/sub channels into per-session queues. One pump
//! task runs per topic, started lazily on the first subscription; the
//! pump reads the store channel and fans payloads out through the
//! session registry, so a slow client can never stall a publisher;
//! backpressure is absorbed by the per-client queues.

use std::sync::Arc;

use dashmap::DashMap;
use store::MemoryStore;
use tracing::{debug, warn};
use types::errors::OesError;

use crate::envelope::{Envelope, EventBody, Topic};
use crate::queue::MessageClass;
use crate::session::{SessionId, SessionRegistry};

pub struct EventBus {
    store: Arc<MemoryStore>,
    sessions: Arc<SessionRegistry>,
    pumps: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl EventBus {
    pub fn new(store: Arc<MemoryStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            sessions,
            pumps: DashMap::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Subscribe a session to a topic, starting the topic's pump if this
    /// is its first subscriber. Idempotent per session.
    pub fn subscribe(&self, session_id: SessionId, topic: &Topic) -> bool {
        let channel = topic.channel();
        self.ensure_pump(topic);
        self.sessions.subscribe(session_id, &channel)
    }

    /// Unsubscribe a session from a topic. Idempotent. The pump stays
    /// alive for future subscribers.
    pub fn unsubscribe(&self, session_id: SessionId, topic: &Topic) -> bool {
        self.sessions.unsubscribe(session_id, &topic.channel())
    }

    /// Publish an envelope body on a topic.
    pub fn publish(&self, topic: &Topic, body: EventBody, timestamp: i64) -> Result<(), OesError> {
        crate::envelope::publish(&self.store, topic, &Envelope::new(body, timestamp))?;
        Ok(())
    }

    fn ensure_pump(&self, topic: &Topic) {
        let channel = topic.channel();
        let class = if topic.is_snapshot_class() {
            MessageClass::Snapshot
        } else {
            MessageClass::Critical
        };
        self.pumps.entry(channel.clone()).or_insert_with(|| {
            let mut rx = self.store.subscribe(&channel);
            let sessions = self.sessions.clone();
            let pump_channel = channel.clone();

            tokio::spawn(async move {
                debug!(channel = %pump_channel, "Topic pump started");
                loop {
                    match rx.recv().await {
                        Ok(payload) => sessions.route(&pump_channel, class, &payload),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(channel = %pump_channel, missed, "Topic pump lagged behind publisher");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        });
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for entry in self.pumps.iter() {
            entry.value().abort();
        }
    }
}
