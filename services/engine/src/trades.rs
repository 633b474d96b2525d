//! Trade persistence
//!
//! Executed trades are stored as `trade:{id}` hashes with a per-symbol
//! recency list `trades:{symbol}` of trade ids, trimmed to a bounded
//! history.

use std::collections::HashMap;

use serde_json::{Map, Value};
use store::MemoryStore;
use types::errors::OesError;
use types::ids::{Symbol, TradeId};
use types::trade::Trade;

const NUMERIC_FIELDS: &[&str] = &["timestamp"];
const HISTORY_LIMIT: isize = 1_000;

fn trade_key(trade_id: &TradeId) -> String {
    format!("trade:{trade_id}")
}

fn history_key(symbol: &Symbol) -> String {
    format!("trades:{symbol}")
}

pub fn to_fields(trade: &Trade) -> Vec<(String, String)> {
    let value = serde_json::to_value(trade).expect("trade serializes");
    let Value::Object(map) = value else {
        unreachable!("trade serializes to an object");
    };
    map.into_iter()
        .map(|(field, value)| match value {
            Value::String(s) => (field, s),
            Value::Number(n) => (field, n.to_string()),
            other => (field, other.to_string()),
        })
        .collect()
}

pub fn from_fields(fields: &HashMap<String, String>) -> Result<Trade, OesError> {
    let mut map = Map::new();
    for (field, value) in fields {
        let json_value = if NUMERIC_FIELDS.contains(&field.as_str()) {
            let n: i64 = value
                .parse()
                .map_err(|_| OesError::Internal(format!("corrupt trade field {field}={value}")))?;
            Value::Number(n.into())
        } else {
            Value::String(value.clone())
        };
        map.insert(field.clone(), json_value);
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|e| OesError::Internal(format!("corrupt trade record: {e}")))
}

/// Write a trade to the store and its symbol's recency list.
pub fn persist(store: &MemoryStore, trade: &Trade) -> Result<(), OesError> {
    store.hset(&trade_key(&trade.trade_id), &to_fields(trade))?;
    let key = history_key(&trade.symbol);
    store.lpush(&key, trade.trade_id.as_str())?;
    store.ltrim(&key, 0, HISTORY_LIMIT - 1)?;
    Ok(())
}

/// Recent trades for a symbol, newest first.
pub fn recent(store: &MemoryStore, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>, OesError> {
    let ids = store.lrange(&history_key(symbol), 0, limit as isize - 1)?;
    let mut trades = Vec::with_capacity(ids.len());
    for id in ids {
        let fields = store.hgetall(&trade_key(&TradeId::from_string(id.as_str())))?;
        if !fields.is_empty() {
            trades.push(from_fields(&fields)?);
        }
    }
    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, OrderId};
    use types::numeric::{Price, Quantity};
    use types::order::Venue;

    fn sample_trade(price: u64) -> Trade {
        Trade::new(
            Symbol::new("AAPL"),
            Price::from_u64(price),
            Quantity::from_u64(5),
            OrderId::new(),
            OrderId::new(),
            AccountId::new(),
            AccountId::new(),
            Venue::Lit,
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_roundtrip() {
        let trade = sample_trade(150);
        let fields: HashMap<String, String> = to_fields(&trade).into_iter().collect();
        assert_eq!(from_fields(&fields).unwrap(), trade);
    }

    #[test]
    fn test_persist_and_recent_newest_first() {
        let store = MemoryStore::new();
        let older = sample_trade(100);
        let newer = sample_trade(101);
        persist(&store, &older).unwrap();
        persist(&store, &newer).unwrap();

        let recent = recent(&store, &Symbol::new("AAPL"), 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].trade_id, newer.trade_id);
        assert_eq!(recent[1].trade_id, older.trade_id);
    }

    #[test]
    fn test_recent_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            persist(&store, &sample_trade(100 + i)).unwrap();
        }
        assert_eq!(recent(&store, &Symbol::new("AAPL"), 2).unwrap().len(), 2);
        assert!(recent(&store, &Symbol::new("MSFT"), 10).unwrap().is_empty());
    }
}
