//! Order lifecycle types

use crate::ids::{AccountId, OrderId, Symbol};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Execution venue for an order
///
/// The lit book is visible in public depth queries; the dark pool is not,
/// but it participates in matching with priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Lit,
    Dark,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Lit => "lit",
            Venue::Dark => "dark",
        }
    }
}

/// Order pricing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Time-in-force policy
///
/// `Day` rests until the end-of-session sweep; `Gtc` rests indefinitely;
/// `Ioc` matches what it can and cancels the rest; `Fok` matches fully or
/// rejects entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

/// Order status
///
/// `Filled`, `Cancelled`, and `Rejected` are terminal. An order rests in
/// the book iff its status is `Open` or `PartiallyFilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether an order with this status rests in the book
    pub fn is_resting(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }
}

/// Complete order record
///
/// `price` is absent for market orders unless the caller supplied a
/// protection cap, in which case it bounds the crossing condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub original_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub venue: Venue,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
}

impl Order {
    /// Create a new order in the `New` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        quantity: Quantity,
        venue: Venue,
        time_in_force: TimeInForce,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            account_id,
            symbol,
            side,
            order_type,
            price,
            original_quantity: quantity,
            remaining_quantity: quantity,
            venue,
            time_in_force,
            status: OrderStatus::New,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Quantity executed so far
    pub fn executed_quantity(&self) -> Quantity {
        self.original_quantity.saturating_sub(self.remaining_quantity)
    }

    /// Check quantity invariant: remaining within [0, original]
    pub fn check_invariant(&self) -> bool {
        self.remaining_quantity <= self.original_quantity
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn has_fills(&self) -> bool {
        !self.executed_quantity().is_zero()
    }

    /// Record a fill against this order and adjust status.
    ///
    /// # Panics
    /// Panics if the fill exceeds the remaining quantity.
    pub fn apply_fill(&mut self, fill_quantity: Quantity, timestamp: i64) {
        assert!(
            fill_quantity <= self.remaining_quantity,
            "Fill would exceed remaining quantity"
        );
        self.remaining_quantity = self.remaining_quantity - fill_quantity;
        self.status = if self.remaining_quantity.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = timestamp;

        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Transition to `Cancelled`, retaining the remaining quantity.
    ///
    /// # Panics
    /// Panics if the order is already in a terminal state.
    pub fn cancel(&mut self, timestamp: i64) {
        assert!(!self.status.is_terminal(), "Cannot cancel terminal order");
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
    }
}
