//! Reservation registry
//!
//! A reservation is the hold placed when an order enters the book: cash
//! for buys (quantity × limit price), position units for sells. Holds
//! shrink proportionally as fills settle and are released in full on
//! cancel or reject. The registry indexes holds both by reservation id
//! and by the order that owns them; an order has at most one live hold.

use dashmap::DashMap;
use rust_decimal::Decimal;
use types::ids::{AccountId, OrderId, ReservationId, Symbol};
use types::order::Side;

/// A live hold against an account
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: ReservationId,
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub side: Side,
    pub symbol: Symbol,
    /// Units still covered by this hold.
    pub remaining_quantity: Decimal,
    /// Cash held per unit (buy reservations only).
    pub price_per_unit: Option<Decimal>,
}

impl Reservation {
    /// Cash currently held by this reservation, zero for sell holds.
    pub fn held_cash(&self) -> Decimal {
        match self.price_per_unit {
            Some(price) => self.remaining_quantity * price,
            None => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReservationRegistry {
    by_id: DashMap<String, Reservation>,
    by_order: DashMap<String, ReservationId>,
}

impl ReservationRegistry {
    pub fn insert(&self, reservation: Reservation) -> ReservationId {
        let id = reservation.id.clone();
        self.by_order
            .insert(reservation.order_id.to_string(), id.clone());
        self.by_id.insert(id.to_string(), reservation);
        id
    }

    pub fn get(&self, id: &ReservationId) -> Option<Reservation> {
        self.by_id.get(id.as_str()).map(|r| r.clone())
    }

    pub fn get_by_order(&self, order_id: &OrderId) -> Option<Reservation> {
        let id = self.by_order.get(order_id.as_str())?.clone();
        self.get(&id)
    }

    /// Remove a hold entirely. Returns it if it existed.
    pub fn remove(&self, id: &ReservationId) -> Option<Reservation> {
        let (_, reservation) = self.by_id.remove(id.as_str())?;
        self.by_order.remove(reservation.order_id.as_str());
        Some(reservation)
    }

    /// Shrink a hold by `quantity`, removing it once exhausted.
    pub fn consume(&self, id: &ReservationId, quantity: Decimal) -> Option<Reservation> {
        let mut entry = self.by_id.get_mut(id.as_str())?;
        entry.remaining_quantity -= quantity;
        let snapshot = entry.clone();
        let exhausted = entry.remaining_quantity <= Decimal::ZERO;
        drop(entry);
        if exhausted {
            self.remove(id);
        }
        Some(snapshot)
    }

    /// Drop every hold. Used when the registry is rebuilt from the
    /// resting order set.
    pub fn clear(&self) {
        self.by_id.clear();
        self.by_order.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_hold(qty: i64, price: i64) -> Reservation {
        Reservation {
            id: ReservationId::new(),
            account_id: AccountId::new(),
            order_id: OrderId::new(),
            side: Side::Buy,
            symbol: Symbol::new("AAPL"),
            remaining_quantity: Decimal::from(qty),
            price_per_unit: Some(Decimal::from(price)),
        }
    }

    #[test]
    fn test_held_cash() {
        let hold = buy_hold(5, 150);
        assert_eq!(hold.held_cash(), Decimal::from(750));
    }

    #[test]
    fn test_lookup_by_order() {
        let registry = ReservationRegistry::default();
        let hold = buy_hold(5, 150);
        let order_id = hold.order_id.clone();
        registry.insert(hold.clone());

        assert_eq!(registry.get_by_order(&order_id), Some(hold));
        assert!(registry.get_by_order(&OrderId::new()).is_none());
    }

    #[test]
    fn test_consume_shrinks_then_removes() {
        let registry = ReservationRegistry::default();
        let hold = buy_hold(5, 150);
        let id = registry.insert(hold.clone());

        registry.consume(&id, Decimal::from(2));
        assert_eq!(
            registry.get(&id).unwrap().remaining_quantity,
            Decimal::from(3)
        );

        registry.consume(&id, Decimal::from(3));
        assert!(registry.get(&id).is_none());
        assert!(registry.get_by_order(&hold.order_id).is_none());
    }

    #[test]
    fn test_clear_empties_registry() {
        let registry = ReservationRegistry::default();
        let hold = buy_hold(5, 150);
        let order_id = hold.order_id.clone();
        registry.insert(hold);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get_by_order(&order_id).is_none());
    }

    #[test]
    fn test_remove_clears_both_indexes() {
        let registry = ReservationRegistry::default();
        let hold = buy_hold(1, 1);
        let id = registry.insert(hold.clone());

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.get_by_order(&hold.order_id).is_none());
        assert!(registry.is_empty());
    }
}
