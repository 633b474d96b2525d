//! Trade execution records

use crate::ids::{AccountId, OrderId, Symbol, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Venue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed trade between a buy and a sell order
///
/// Immutable once created. The venue records where the resting side was
/// matched (dark trades never appear in public depth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buy_account_id: AccountId,
    pub sell_account_id: AccountId,
    pub venue: Venue,
    pub timestamp: i64, // Unix nanos
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buy_account_id: AccountId,
        sell_account_id: AccountId,
        venue: Venue,
        timestamp: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            symbol,
            price,
            quantity,
            buy_order_id,
            sell_order_id,
            buy_account_id,
            sell_account_id,
            venue,
            timestamp,
        }
    }

    /// Notional value (price × quantity)
    pub fn trade_value(&self) -> Decimal {
        self.quantity * self.price
    }
}
