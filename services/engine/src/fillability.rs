//! Fill-or-kill fillability check
//!
//! Before a FOK order enters the matching loop, the engine proves the
//! full quantity is available at crossing prices with a non-mutating
//! walk over both opposite books. If the walk comes up short the order
//! is rejected outright and no fills are emitted.

use book::OrderBook;
use rust_decimal::Decimal;
use types::errors::OesError;
use types::order::{Order, Venue};

use crate::crossing;

/// Whether `order` could be filled completely against the current
/// opposite-side liquidity within its limit (or cap).
pub fn fully_fillable(book: &OrderBook, order: &Order) -> Result<bool, OesError> {
    let opposite = order.side.opposite();
    let mut needed = order.remaining_quantity.as_decimal();

    for venue in [Venue::Dark, Venue::Lit] {
        for resting in book.resting_orders(&order.symbol, opposite, venue, None)? {
            let Some(price) = resting.price else { continue };
            // Best price first: once one level stops crossing, deeper
            // levels cannot cross either.
            if !crossing::crosses(order.side, order.price, price) {
                break;
            }
            needed -= resting.remaining_quantity.as_decimal();
            if needed <= Decimal::ZERO {
                return Ok(true);
            }
        }
    }
    Ok(needed <= Decimal::ZERO)
}
