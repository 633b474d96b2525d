//! Event topics and message envelopes
//!
//! Topics use `:` as the separator: `orderbook:{symbol}`,
//! `trades:{symbol}`, `notifications`, `system`. Every outbound message
//! is an envelope `{type, timestamp, ...payload}`.

use book::DepthSnapshot;
use serde::{Deserialize, Serialize};
use types::errors::OesError;
use types::ids::{AccountId, Symbol, TradeId};
use types::numeric::{Price, Quantity};
use types::trade::Trade;

/// A subscribable topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Orderbook(Symbol),
    Trades(Symbol),
    Notifications,
    System,
}

impl Topic {
    /// The channel string for this topic.
    pub fn channel(&self) -> String {
        match self {
            Topic::Orderbook(symbol) => format!("orderbook:{symbol}"),
            Topic::Trades(symbol) => format!("trades:{symbol}"),
            Topic::Notifications => "notifications".to_string(),
            Topic::System => "system".to_string(),
        }
    }

    /// Parse a channel string into a topic.
    pub fn parse(channel: &str) -> Option<Self> {
        match channel.split_once(':') {
            Some(("orderbook", symbol)) => Symbol::try_new(symbol).map(Topic::Orderbook),
            Some(("trades", symbol)) => Symbol::try_new(symbol).map(Topic::Trades),
            None if channel == "notifications" => Some(Topic::Notifications),
            None if channel == "system" => Some(Topic::System),
            _ => None,
        }
    }

    /// Snapshot-class topics may drop stale messages under backpressure;
    /// everything else is never dropped.
    pub fn is_snapshot_class(&self) -> bool {
        matches!(self, Topic::Orderbook(_))
    }
}

/// Toast payload attached to user-facing notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub variant: String,
    pub duration_ms: u64,
}

impl Toast {
    pub fn success(title: &str, message: String) -> Self {
        Self {
            title: title.to_string(),
            message,
            variant: "success".to_string(),
            duration_ms: 5_000,
        }
    }
}

/// Message payloads, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Orderbook {
        symbol: Symbol,
        data: DepthSnapshot,
    },
    Trade {
        data: Trade,
    },
    TradeExecuted {
        message: String,
        trade_id: TradeId,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        buy_account_id: AccountId,
        sell_account_id: AccountId,
        toast: Toast,
    },
    OrdersUpdated,
    Latency {
        value_ms: f64,
    },
    Toast {
        title: String,
        message: String,
        variant: String,
    },
    Error {
        message: String,
    },
    Subscription {
        channel: String,
        status: String,
    },
    Pong,
}

/// Wire envelope: `{type, timestamp, ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Envelope {
    pub fn new(body: EventBody, timestamp: i64) -> Self {
        Self { timestamp, body }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("envelope serializes")
    }
}

/// Publish an envelope on a topic's store channel.
pub fn publish(store: &store::MemoryStore, topic: &Topic, envelope: &Envelope) -> Result<usize, OesError> {
    Ok(store.publish(&topic.channel(), &envelope.to_json())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        for topic in [
            Topic::Orderbook(Symbol::new("AAPL")),
            Topic::Trades(Symbol::new("MSFT")),
            Topic::Notifications,
            Topic::System,
        ] {
            assert_eq!(Topic::parse(&topic.channel()), Some(topic.clone()));
        }
    }

    #[test]
    fn test_topic_parse_rejects_unknown() {
        assert_eq!(Topic::parse("nonsense"), None);
        assert_eq!(Topic::parse("orderbook:"), None);
        assert_eq!(Topic::parse("candles:AAPL"), None);
    }

    #[test]
    fn test_snapshot_class() {
        assert!(Topic::Orderbook(Symbol::new("AAPL")).is_snapshot_class());
        assert!(!Topic::Trades(Symbol::new("AAPL")).is_snapshot_class());
        assert!(!Topic::Notifications.is_snapshot_class());
    }

    #[test]
    fn test_envelope_flattens_type_tag() {
        let envelope = Envelope::new(EventBody::Latency { value_ms: 1.25 }, 42);
        let json = envelope.to_json();
        assert!(json.contains("\"type\":\"latency\""));
        assert!(json.contains("\"timestamp\":42"));
        assert!(json.contains("\"value_ms\":1.25"));

        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn test_pong_envelope_shape() {
        let envelope = Envelope::new(EventBody::Pong, 7);
        assert_eq!(envelope.to_json(), "{\"timestamp\":7,\"type\":\"pong\"}");
    }

    #[tokio::test]
    async fn test_publish_reaches_store_channel() {
        let store = store::MemoryStore::new();
        let topic = Topic::Trades(Symbol::new("AAPL"));
        let mut rx = store.subscribe(&topic.channel());

        let envelope = Envelope::new(EventBody::OrdersUpdated, 1);
        publish(&store, &topic, &envelope).unwrap();

        let raw = rx.recv().await.unwrap();
        assert!(raw.contains("\"type\":\"orders_updated\""));
    }
}
