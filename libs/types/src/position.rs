//! Position tracking types

use crate::ids::{AccountId, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An account's holding in a single symbol
///
/// `quantity` is signed: negative values are short positions (permitted
/// only for high-risk accounts). `reserved` tracks units held by open sell
/// orders; `avg_price` is the volume-weighted entry price of the long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub reserved: Decimal,
    pub updated_at: i64, // Unix nanos
}

impl Position {
    pub fn new(account_id: AccountId, symbol: Symbol, timestamp: i64) -> Self {
        Self {
            account_id,
            symbol,
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            reserved: Decimal::ZERO,
            updated_at: timestamp,
        }
    }

    /// Units available to sell without shorting
    pub fn available(&self) -> Decimal {
        self.quantity - self.reserved
    }

    /// Apply a buy fill: increase quantity and fold the fill into the vwap.
    ///
    /// new vwap = (old_qty * old_vwap + qty * price) / new_qty
    pub fn apply_buy(&mut self, quantity: Decimal, price: Decimal, timestamp: i64) {
        let new_quantity = self.quantity + quantity;
        if new_quantity > Decimal::ZERO {
            let old_value = self.quantity * self.avg_price;
            self.avg_price = (old_value + quantity * price) / new_quantity;
        } else {
            self.avg_price = Decimal::ZERO;
        }
        self.quantity = new_quantity;
        self.updated_at = timestamp;
    }

    /// Apply a sell fill: decrease quantity, vwap unchanged.
    ///
    /// A position flipping through zero to short re-anchors the vwap at the
    /// sale price.
    pub fn apply_sell(&mut self, quantity: Decimal, price: Decimal, timestamp: i64) {
        let was_long = self.quantity > Decimal::ZERO;
        self.quantity -= quantity;
        if self.quantity <= Decimal::ZERO && was_long {
            self.avg_price = if self.quantity < Decimal::ZERO { price } else { Decimal::ZERO };
        }
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn position() -> Position {
        Position::new(AccountId::new(), Symbol::new("AAPL"), 0)
    }

    #[test]
    fn test_buy_sets_vwap() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(10), Decimal::from(100), 1);

        assert_eq!(pos.quantity, Decimal::from(10));
        assert_eq!(pos.avg_price, Decimal::from(100));
    }

    #[test]
    fn test_vwap_blends_across_buys() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(10), Decimal::from(100), 1);
        pos.apply_buy(Decimal::from(10), Decimal::from(110), 2);

        // (10*100 + 10*110) / 20 = 105
        assert_eq!(pos.avg_price, Decimal::from(105));
        assert_eq!(pos.quantity, Decimal::from(20));
    }

    #[test]
    fn test_sell_keeps_vwap() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(10), Decimal::from(100), 1);
        pos.apply_sell(Decimal::from(4), Decimal::from(120), 2);

        assert_eq!(pos.quantity, Decimal::from(6));
        assert_eq!(pos.avg_price, Decimal::from(100));
    }

    #[test]
    fn test_sell_to_flat_clears_vwap() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(5), Decimal::from(100), 1);
        pos.apply_sell(Decimal::from(5), Decimal::from(110), 2);

        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.avg_price, Decimal::ZERO);
    }

    #[test]
    fn test_sell_through_zero_anchors_short_vwap() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(2), Decimal::from(100), 1);
        pos.apply_sell(Decimal::from(5), Decimal::from(90), 2);

        assert_eq!(pos.quantity, Decimal::from(-3));
        assert_eq!(pos.avg_price, Decimal::from(90));
    }

    #[test]
    fn test_available_subtracts_reserved() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(10), Decimal::from(100), 1);
        pos.reserved = Decimal::from(4);

        assert_eq!(pos.available(), Decimal::from(6));
    }

    #[test]
    fn test_fractional_vwap() {
        let mut pos = position();
        pos.apply_buy(Decimal::from(3), Decimal::from_str("100.50").unwrap(), 1);
        pos.apply_buy(Decimal::from(1), Decimal::from_str("102.50").unwrap(), 2);

        // (3*100.50 + 1*102.50) / 4 = 101
        assert_eq!(pos.avg_price, Decimal::from(101));
    }
}
