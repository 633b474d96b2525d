//! Dual-venue order book
//!
//! Each symbol has two books: the public lit book and the dark pool.
//! Within a (venue, symbol, side), resting orders rank by price-time
//! priority: best price first, oldest first within a price. The sorted
//! set holds order ids scored by `(price_key, sequence)`, with bid
//! prices negated so best-first is a forward scan on both sides. The
//! companion `order:{id}` hash holds the full record.
//!
//! Invariant: an order id is in a side's sorted set iff its hash status
//! is `open` or `partially_filled`. Mutating operations serialize on a
//! per-symbol lock; readers go straight to the store.

pub mod codec;
pub mod keys;

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use store::{MemoryStore, Score};
use tracing::{debug, warn};
use types::errors::OesError;
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, Side, Venue};

/// Aggregated liquidity at one price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Top-N aggregated view of one venue's book for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: Symbol,
    pub venue: Venue,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Result of a cancel request
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The order was resting and has been cancelled.
    Cancelled(Order),
    /// The order was already terminal; nothing changed.
    AlreadyTerminal(Order),
}

/// The dual-venue order book service
pub struct OrderBook {
    store: Arc<MemoryStore>,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OrderBook {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            symbol_locks: DashMap::new(),
        }
    }

    fn symbol_lock(&self, symbol: &Symbol) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.as_str().to_string())
            .or_default()
            .clone()
    }

    fn price_key(side: Side, price: Price) -> rust_decimal::Decimal {
        match side {
            Side::Buy => -price.as_decimal(),
            Side::Sell => price.as_decimal(),
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Insert a resting order into its venue's book.
    ///
    /// The order must be a priced limit order with remaining quantity and
    /// a resting status; anything else is rejected.
    pub fn insert(&self, order: &Order) -> Result<(), OesError> {
        if order.remaining_quantity.is_zero() {
            return Err(OesError::Validation(
                "cannot rest an order with no remaining quantity".into(),
            ));
        }
        if !order.status.is_resting() {
            return Err(OesError::Validation(format!(
                "cannot rest an order in status {}",
                order.status.as_str()
            )));
        }
        let Some(price) = order.price else {
            return Err(OesError::Validation("cannot rest an order without a price".into()));
        };

        let lock = self.symbol_lock(&order.symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let sequence = self.store.next_sequence();
        let mut fields = codec::to_fields(order);
        fields.push((codec::SEQUENCE_FIELD.to_string(), sequence.to_string()));
        self.store.hset(&keys::order_key(&order.order_id), &fields)?;

        let score = Score::new(Self::price_key(order.side, price), sequence);
        self.store
            .zadd(&keys::side_key(order.venue, &order.symbol, order.side), score, order.order_id.as_str())?;

        debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            venue = order.venue.as_str(),
            side = order.side.as_str(),
            price = %price,
            "Order resting in book"
        );
        Ok(())
    }

    /// Head order at the best price for a (symbol, side, venue), if any.
    ///
    /// Dangling sorted-set entries (no backing hash, or a non-resting
    /// status) are removed on sight.
    pub fn peek_best(&self, symbol: &Symbol, side: Side, venue: Venue) -> Result<Option<Order>, OesError> {
        let side_key = keys::side_key(venue, symbol, side);
        loop {
            let head = self.store.zrange(&side_key, 0, 0, false)?;
            let Some(entry) = head.first() else {
                return Ok(None);
            };
            let fields = self.store.hgetall(&keys::order_key(&OrderId::from_string(entry.member.as_str())))?;
            if fields.is_empty() {
                warn!(member = %entry.member, key = %side_key, "Removing dangling book entry");
                self.store.zrem(&side_key, &entry.member)?;
                continue;
            }
            let order = codec::from_fields(&fields)?;
            if !order.status.is_resting() {
                warn!(order_id = %order.order_id, status = order.status.as_str(), "Removing non-resting book entry");
                self.store.zrem(&side_key, &entry.member)?;
                continue;
            }
            return Ok(Some(order));
        }
    }

    /// Atomically decrement an order's remaining quantity by `qty`.
    ///
    /// Fails with `Stale` if the order is no longer resting or holds less
    /// than `qty` at the time of the operation. An order consumed to zero
    /// is marked `filled` and leaves the sorted set.
    pub fn consume(&self, order_id: &OrderId, qty: Quantity, timestamp: i64) -> Result<Order, OesError> {
        let existing = self
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;

        let lock = self.symbol_lock(&existing.symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let key = keys::order_key(order_id);
        let updated = self.store.with_hash(&key, |hash| -> Result<Order, OesError> {
            if hash.is_empty() {
                return Err(OesError::UnknownOrder(order_id.to_string()));
            }
            let mut order = codec::from_fields(hash)?;
            if !order.status.is_resting() || order.remaining_quantity < qty {
                return Err(OesError::Stale);
            }
            order.apply_fill(qty, timestamp);
            for (field, value) in codec::to_fields(&order) {
                hash.insert(field, value);
            }
            Ok(order)
        })??;

        if updated.status == OrderStatus::Filled {
            let side_key = keys::side_key(updated.venue, &updated.symbol, updated.side);
            self.store.zrem(&side_key, order_id.as_str())?;
        }
        Ok(updated)
    }

    /// Undo a `consume`: restore quantity and re-enter the sorted set at
    /// the order's original priority. Used by the engine's rollback path
    /// when the ledger rejects a fill.
    pub fn restore(&self, order_id: &OrderId, qty: Quantity, timestamp: i64) -> Result<Order, OesError> {
        let existing = self
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;

        let lock = self.symbol_lock(&existing.symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let key = keys::order_key(order_id);
        let (restored, sequence) = self.store.with_hash(&key, |hash| -> Result<(Order, Option<u64>), OesError> {
            if hash.is_empty() {
                return Err(OesError::UnknownOrder(order_id.to_string()));
            }
            let mut order = codec::from_fields(hash)?;
            let new_remaining = order.remaining_quantity + qty;
            if new_remaining > order.original_quantity {
                return Err(OesError::Internal(format!(
                    "restore would exceed original quantity on {order_id}"
                )));
            }
            order.remaining_quantity = new_remaining;
            order.status = if order.executed_quantity().is_zero() {
                OrderStatus::Open
            } else {
                OrderStatus::PartiallyFilled
            };
            order.updated_at = timestamp;
            for (field, value) in codec::to_fields(&order) {
                hash.insert(field, value);
            }
            Ok((order.clone(), codec::sequence_of(hash)))
        })??;

        let side_key = keys::side_key(restored.venue, &restored.symbol, restored.side);
        if self.store.zscore(&side_key, order_id.as_str())?.is_none() {
            let price = restored
                .price
                .ok_or_else(|| OesError::Internal(format!("resting order {order_id} has no price")))?;
            let sequence =
                sequence.ok_or_else(|| OesError::Internal(format!("order {order_id} has no book sequence")))?;
            self.store
                .zadd(&side_key, Score::new(Self::price_key(restored.side, price), sequence), order_id.as_str())?;
        }
        Ok(restored)
    }

    /// Amend a resting order's price and/or total quantity.
    ///
    /// A quantity-only decrease keeps time priority. Any price change or
    /// quantity increase forfeits it: the order re-enters its level with a
    /// fresh sequence. Quantity may not drop below the executed amount.
    pub fn amend(
        &self,
        order_id: &OrderId,
        new_price: Option<Price>,
        new_quantity: Option<Quantity>,
        timestamp: i64,
    ) -> Result<Order, OesError> {
        let existing = self
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;

        if existing.status.is_terminal() {
            return Err(OesError::AlreadyTerminal {
                status: existing.status.as_str().to_string(),
            });
        }
        if !existing.status.is_resting() {
            return Err(OesError::InvalidAmend(format!(
                "order in status {} cannot be amended",
                existing.status.as_str()
            )));
        }

        let executed = existing.executed_quantity();
        let target_quantity = new_quantity.unwrap_or(existing.original_quantity);
        if target_quantity < executed {
            return Err(OesError::InvalidAmend(format!(
                "quantity {target_quantity} is below the executed amount {executed}"
            )));
        }

        let price_changed = match (new_price, existing.price) {
            (Some(p), Some(old)) => p != old,
            (Some(_), None) | (None, None) => false,
            (None, Some(_)) => false,
        };
        let quantity_increased = target_quantity > existing.original_quantity;
        let reprioritize = price_changed || quantity_increased;

        let lock = self.symbol_lock(&existing.symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let side_key = keys::side_key(existing.venue, &existing.symbol, existing.side);
        let fresh_sequence = if reprioritize { Some(self.store.next_sequence()) } else { None };

        let key = keys::order_key(order_id);
        let amended = self.store.with_hash(&key, |hash| -> Result<Order, OesError> {
            if hash.is_empty() {
                return Err(OesError::UnknownOrder(order_id.to_string()));
            }
            let mut order = codec::from_fields(hash)?;
            if !order.status.is_resting() {
                return Err(OesError::Stale);
            }
            order.original_quantity = target_quantity;
            order.remaining_quantity = target_quantity - executed;
            if let Some(price) = new_price {
                order.price = Some(price);
            }
            order.status = if order.remaining_quantity.is_zero() {
                OrderStatus::Filled
            } else if executed.is_zero() {
                OrderStatus::Open
            } else {
                OrderStatus::PartiallyFilled
            };
            order.updated_at = timestamp;
            for (field, value) in codec::to_fields(&order) {
                hash.insert(field, value);
            }
            if let Some(sequence) = fresh_sequence {
                hash.insert(codec::SEQUENCE_FIELD.to_string(), sequence.to_string());
            }
            Ok(order)
        })??;

        if amended.status == OrderStatus::Filled {
            // Quantity reduced exactly to the executed amount.
            self.store.zrem(&side_key, order_id.as_str())?;
        } else if let Some(sequence) = fresh_sequence {
            let price = amended
                .price
                .ok_or_else(|| OesError::Internal(format!("resting order {order_id} has no price")))?;
            self.store.zrem(&side_key, order_id.as_str())?;
            self.store
                .zadd(&side_key, Score::new(Self::price_key(amended.side, price), sequence), order_id.as_str())?;
            debug!(order_id = %order_id, "Amend forfeited time priority");
        }
        Ok(amended)
    }

    /// Cancel an order, removing it from the book.
    ///
    /// Idempotent: cancelling an already-terminal order reports
    /// `AlreadyTerminal` without error.
    pub fn cancel(&self, order_id: &OrderId, timestamp: i64) -> Result<CancelOutcome, OesError> {
        let existing = self
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;

        if existing.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(existing));
        }

        let lock = self.symbol_lock(&existing.symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let key = keys::order_key(order_id);
        let cancelled = self.store.with_hash(&key, |hash| -> Result<Order, OesError> {
            if hash.is_empty() {
                return Err(OesError::UnknownOrder(order_id.to_string()));
            }
            let mut order = codec::from_fields(hash)?;
            if order.status.is_terminal() {
                return Ok(order);
            }
            order.cancel(timestamp);
            for (field, value) in codec::to_fields(&order) {
                hash.insert(field, value);
            }
            Ok(order)
        })??;

        let side_key = keys::side_key(cancelled.venue, &cancelled.symbol, cancelled.side);
        self.store.zrem(&side_key, order_id.as_str())?;

        debug!(order_id = %order_id, "Order cancelled");
        Ok(CancelOutcome::Cancelled(cancelled))
    }

    /// Write an order's record without touching the sorted sets.
    ///
    /// Used for orders that never rest (market remainders, rejected or
    /// filled incoming orders) but must stay queryable by id.
    pub fn persist(&self, order: &Order) -> Result<(), OesError> {
        self.store
            .hset(&keys::order_key(&order.order_id), &codec::to_fields(order))?;
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// The book priority sequence a resting order was inserted with.
    pub fn priority_sequence(&self, order_id: &OrderId) -> Result<Option<u64>, OesError> {
        let fields = self.store.hgetall(&keys::order_key(order_id))?;
        Ok(codec::sequence_of(&fields))
    }

    /// Fetch an order record by id.
    pub fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, OesError> {
        let fields = self.store.hgetall(&keys::order_key(order_id))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(codec::from_fields(&fields)?))
    }

    /// Resting orders for a (symbol, side, venue), best price first.
    pub fn resting_orders(
        &self,
        symbol: &Symbol,
        side: Side,
        venue: Venue,
        max: Option<usize>,
    ) -> Result<Vec<Order>, OesError> {
        let side_key = keys::side_key(venue, symbol, side);
        let stop = max.map(|m| m as isize - 1).unwrap_or(-1);
        let entries = self.store.zrange(&side_key, 0, stop, false)?;

        let mut orders = Vec::with_capacity(entries.len());
        for entry in entries {
            let fields = self.store.hgetall(&keys::order_key(&OrderId::from_string(entry.member.as_str())))?;
            if fields.is_empty() {
                warn!(member = %entry.member, key = %side_key, "Skipping dangling book entry");
                self.store.zrem(&side_key, &entry.member)?;
                continue;
            }
            let order = codec::from_fields(&fields)?;
            if !order.status.is_resting() {
                self.store.zrem(&side_key, &entry.member)?;
                continue;
            }
            orders.push(order);
        }
        Ok(orders)
    }

    /// Up to N aggregated price levels per side for one venue.
    pub fn depth(&self, symbol: &Symbol, venue: Venue, levels: usize) -> Result<DepthSnapshot, OesError> {
        let aggregate = |orders: Vec<Order>| -> Vec<DepthLevel> {
            let mut out: Vec<DepthLevel> = Vec::new();
            for order in orders {
                let Some(price) = order.price else { continue };
                match out.last_mut() {
                    Some(level) if level.price == price => {
                        level.quantity = level.quantity + order.remaining_quantity;
                        level.order_count += 1;
                    }
                    _ => {
                        if out.len() == levels {
                            break;
                        }
                        out.push(DepthLevel {
                            price,
                            quantity: order.remaining_quantity,
                            order_count: 1,
                        });
                    }
                }
            }
            out
        };

        Ok(DepthSnapshot {
            symbol: symbol.clone(),
            venue,
            bids: aggregate(self.resting_orders(symbol, Side::Buy, venue, None)?),
            asks: aggregate(self.resting_orders(symbol, Side::Sell, venue, None)?),
        })
    }

    /// Every resting order across all symbols, sides, and venues.
    ///
    /// Feeds the ledger's reservation rebuild at startup.
    pub fn all_resting_orders(&self) -> Result<Vec<Order>, OesError> {
        let mut orders = Vec::new();
        for symbol in self.symbols()? {
            for side in [Side::Buy, Side::Sell] {
                for venue in [Venue::Lit, Venue::Dark] {
                    orders.extend(self.resting_orders(&symbol, side, venue, None)?);
                }
            }
        }
        Ok(orders)
    }

    /// All symbols with any resting liquidity in either venue.
    pub fn symbols(&self) -> Result<Vec<Symbol>, OesError> {
        let mut found: Vec<String> = self
            .store
            .keys("book:*")?
            .iter()
            .filter_map(|k| keys::symbol_from_side_key(k).map(str::to_string))
            .collect();
        found.sort();
        found.dedup();
        Ok(found.into_iter().filter_map(Symbol::try_new).collect())
    }

    /// Whether the consolidated (lit ∪ dark) book has liquidity on both
    /// sides of a symbol.
    pub fn has_two_sided_liquidity(&self, symbol: &Symbol) -> Result<bool, OesError> {
        let count = |side: Side| -> Result<usize, OesError> {
            Ok(self.store.zcard(&keys::side_key(Venue::Lit, symbol, side))?
                + self.store.zcard(&keys::side_key(Venue::Dark, symbol, side))?)
        };
        Ok(count(Side::Buy)? > 0 && count(Side::Sell)? > 0)
    }

    // ── Account order index ─────────────────────────────────────────

    /// Record an order id under its account's order index.
    pub fn record_account_order(&self, account_id: &AccountId, order_id: &OrderId) -> Result<(), OesError> {
        self.store
            .lpush(&keys::account_orders_key(account_id), order_id.as_str())?;
        Ok(())
    }

    /// All orders ever submitted by an account, newest first.
    pub fn orders_for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, OesError> {
        let ids = self.store.lrange(&keys::account_orders_key(account_id), 0, -1)?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.get_order(&OrderId::from_string(id.as_str()))? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}
