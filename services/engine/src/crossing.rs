//! Crossing predicates
//!
//! An incoming buy crosses a resting ask when the ask price is at or
//! below the buy's limit; symmetric for sells. A market order without a
//! protection cap crosses unconditionally. The trade always prints at
//! the resting order's price.

use types::numeric::Price;
use types::order::Side;

/// Whether an incoming order crosses a resting order at `resting_price`.
///
/// `incoming_limit` is the limit price, the market protection cap, or
/// `None` for an unprotected market order.
pub fn crosses(incoming_side: Side, incoming_limit: Option<Price>, resting_price: Price) -> bool {
    match (incoming_side, incoming_limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => resting_price <= limit,
        (Side::Sell, Some(limit)) => resting_price >= limit,
    }
}

/// Whether two resting orders cross (bid at or above ask).
pub fn book_crosses(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}
