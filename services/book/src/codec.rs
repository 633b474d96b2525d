//! Order record codec
//!
//! Orders persist as flat string-field hashes under `order:{id}`. The
//! codec maps between the typed `Order` and that field map. Timestamps
//! are the only numeric fields; everything else is already a string on
//! the wire. Extra fields in a stored hash (e.g. the book's priority
//! sequence) are preserved by readers and ignored by the decoder.

use std::collections::HashMap;

use serde_json::{Map, Value};
use types::errors::OesError;
use types::order::Order;

const NUMERIC_FIELDS: &[&str] = &["created_at", "updated_at"];

/// Field written by the book to remember an order's priority sequence.
pub const SEQUENCE_FIELD: &str = "book_sequence";

/// Flatten an order into hash fields. Absent optional fields (market
/// order price) are omitted entirely.
pub fn to_fields(order: &Order) -> Vec<(String, String)> {
    let value = serde_json::to_value(order).expect("order serializes");
    let Value::Object(map) = value else {
        unreachable!("order serializes to an object");
    };
    map.into_iter()
        .filter_map(|(field, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((field, s)),
            Value::Number(n) => Some((field, n.to_string())),
            other => Some((field, other.to_string())),
        })
        .collect()
}

/// Rebuild an order from hash fields.
///
/// Fails with `Internal` on corrupt records: a resting order the codec
/// cannot decode indicates a store-level consistency bug, not bad input.
pub fn from_fields(fields: &HashMap<String, String>) -> Result<Order, OesError> {
    let mut map = Map::new();
    for (field, value) in fields {
        if field == SEQUENCE_FIELD {
            continue;
        }
        let json_value = if NUMERIC_FIELDS.contains(&field.as_str()) {
            let n: i64 = value
                .parse()
                .map_err(|_| OesError::Internal(format!("corrupt order field {field}={value}")))?;
            Value::Number(n.into())
        } else {
            Value::String(value.clone())
        };
        map.insert(field.clone(), json_value);
    }
    serde_json::from_value(Value::Object(map))
        .map_err(|e| OesError::Internal(format!("corrupt order record: {e}")))
}

/// Read the book priority sequence a stored order carries, if any.
pub fn sequence_of(fields: &HashMap<String, String>) -> Option<u64> {
    fields.get(SEQUENCE_FIELD).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, Symbol};
    use types::numeric::{Price, Quantity};
    use types::order::{OrderType, Side, TimeInForce, Venue};

    fn sample_order() -> Order {
        Order::new(
            AccountId::new(),
            Symbol::new("AAPL"),
            Side::Buy,
            OrderType::Limit,
            Some(Price::from_u64(150)),
            Quantity::from_u64(5),
            Venue::Lit,
            TimeInForce::Gtc,
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_roundtrip() {
        let order = sample_order();
        let fields: HashMap<String, String> = to_fields(&order).into_iter().collect();
        let back = from_fields(&fields).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn test_market_order_price_omitted() {
        let mut order = sample_order();
        order.order_type = OrderType::Market;
        order.price = None;

        let fields: HashMap<String, String> = to_fields(&order).into_iter().collect();
        assert!(!fields.contains_key("price"));

        let back = from_fields(&fields).unwrap();
        assert_eq!(back.price, None);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let order = sample_order();
        let mut fields: HashMap<String, String> = to_fields(&order).into_iter().collect();
        fields.insert(SEQUENCE_FIELD.into(), "42".into());

        let back = from_fields(&fields).unwrap();
        assert_eq!(order, back);
        assert_eq!(sequence_of(&fields), Some(42));
    }

    #[test]
    fn test_corrupt_timestamp_is_internal_error() {
        let order = sample_order();
        let mut fields: HashMap<String, String> = to_fields(&order).into_iter().collect();
        fields.insert("created_at".into(), "not-a-number".into());

        let err = from_fields(&fields).unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }
}
