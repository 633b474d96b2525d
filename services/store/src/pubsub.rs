//! Pub/sub channel registry
//!
//! Channels are broadcast fans: every subscriber of a channel receives
//! every payload published after it subscribed. Publishing to a channel
//! nobody listens on is a no-op. Channel receivers have a fixed buffer;
//! slow consumers observe a lag error rather than stalling publishers;
//! the event bus layers its own per-client queues on top.

use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    senders: DashMap<String, broadcast::Sender<String>>,
}

impl ChannelRegistry {
    /// Deliver a payload to all current subscribers. Returns how many
    /// receivers were subscribed at publish time.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        match self.senders.get(channel) {
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to a channel, creating its sender on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.senders
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
