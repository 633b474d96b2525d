//! Store key builders
//!
//! Keyspace layout:
//! - `book:{venue}:{symbol}:bids|asks`: sorted sets of resting order ids
//! - `order:{id}`: hash of order fields
//! - `acct-orders:{account_id}`: list of order ids submitted by an account

use types::ids::{AccountId, OrderId, Symbol};
use types::order::{Side, Venue};

pub fn side_key(venue: Venue, symbol: &Symbol, side: Side) -> String {
    let shelf = match side {
        Side::Buy => "bids",
        Side::Sell => "asks",
    };
    format!("book:{}:{}:{}", venue.as_str(), symbol, shelf)
}

pub fn order_key(order_id: &OrderId) -> String {
    format!("order:{}", order_id)
}

pub fn account_orders_key(account_id: &AccountId) -> String {
    format!("acct-orders:{}", account_id)
}

/// Extract the symbol segment from a `book:{venue}:{symbol}:{side}` key.
pub fn symbol_from_side_key(key: &str) -> Option<&str> {
    let mut parts = key.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("book"), Some(_venue), Some(symbol), Some(_side), None) => Some(symbol),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_key_shapes() {
        let sym = Symbol::new("AAPL");
        assert_eq!(side_key(Venue::Lit, &sym, Side::Buy), "book:lit:AAPL:bids");
        assert_eq!(side_key(Venue::Dark, &sym, Side::Sell), "book:dark:AAPL:asks");
    }

    #[test]
    fn test_symbol_from_side_key() {
        assert_eq!(symbol_from_side_key("book:lit:AAPL:bids"), Some("AAPL"));
        assert_eq!(symbol_from_side_key("book:dark:BRK.B:asks"), Some("BRK.B"));
        assert_eq!(symbol_from_side_key("order:ord-1"), None);
        assert_eq!(symbol_from_side_key("book:lit:AAPL"), None);
    }
}
