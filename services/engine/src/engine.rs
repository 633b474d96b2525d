//! Matching engine
//!
//! Continuous crossing over both venues of a symbol. Every crossing
//! step prefers the dark pool and falls back to the lit book only when
//! no dark liquidity crosses; the trade prints at the resting order's
//! price. Matching decisions for one symbol serialize on that symbol's
//! match lock, making the engine a single writer per symbol while
//! queries stay concurrent.
//!
//! A fill is one atomic step: consume the resting order, settle both
//! ledger sides, decrement the incoming order. A `Stale` consume is
//! retried a bounded number of times; a ledger failure rolls the
//! consume back and stops matching for that order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use book::{CancelOutcome, OrderBook};
use dashmap::DashMap;
use ledger::AccountLedger;
use rust_decimal::Decimal;
use store::MemoryStore;
use tracing::{debug, error, info, warn};
use types::errors::OesError;
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, OrderType, Side, TimeInForce, Venue};
use types::time::now_nanos;
use types::trade::Trade;

use crate::crossing;
use crate::fillability;
use crate::trades;
use crate::validation::{self, RiskLimits};
use feed::envelope::{self, Envelope, EventBody, Toast, Topic};

/// Maximum `STALE` race losses tolerated in one matching loop.
const MAX_MATCH_RETRIES: u32 = 8;
/// Safety bound on crossing rounds in one tick pass over a symbol.
const TICK_ROUNDS: usize = 256;
/// Depth levels carried in published order-book updates.
const UPDATE_DEPTH: usize = 10;

/// Parameters of a new order submission
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub venue: Venue,
    pub time_in_force: TimeInForce,
}

/// The matching engine service
pub struct MatchingEngine {
    store: Arc<MemoryStore>,
    book: Arc<OrderBook>,
    ledger: Arc<AccountLedger>,
    match_locks: DashMap<String, Arc<Mutex<()>>>,
    last_trade_price: DashMap<String, Decimal>,
    limits: RiskLimits,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        book: Arc<OrderBook>,
        ledger: Arc<AccountLedger>,
        limits: RiskLimits,
    ) -> Self {
        Self {
            store,
            book,
            ledger,
            match_locks: DashMap::new(),
            last_trade_price: DashMap::new(),
            limits,
        }
    }

    fn match_lock(&self, symbol: &Symbol) -> Arc<Mutex<()>> {
        self.match_locks
            .entry(symbol.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Last trade price seen for a symbol, if any.
    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.last_trade_price.get(symbol.as_str()).map(|p| *p)
    }

    // ── Order entry ─────────────────────────────────────────────────

    /// Submit a new order: validate, reserve, match, and handle the
    /// remainder per its time in force.
    ///
    /// Returns the final order record. A FOK order that cannot be fully
    /// filled comes back `rejected`; the failure reason travels on the
    /// notifications topic.
    pub fn submit(&self, request: NewOrderRequest, timestamp: i64) -> Result<Order, OesError> {
        validation::validate_order(
            request.order_type,
            request.price,
            request.quantity,
            &self.limits,
            self.last_price(&request.symbol),
        )?;
        // Market orders never rest; any price on one is a protection cap.
        let price = request.price;

        let mut order = Order::new(
            request.account_id,
            request.symbol,
            request.side,
            request.order_type,
            price,
            request.quantity,
            request.venue,
            request.time_in_force,
            timestamp,
        );

        // Hold funds or position units. An unprotected market buy has no
        // price to hold against; its fills settle from available funds.
        let needs_hold = order.side == Side::Sell || order.price.is_some();
        if needs_hold {
            self.ledger.reserve(
                &order.account_id,
                &order.order_id,
                order.side,
                &order.symbol,
                order.remaining_quantity,
                order.price,
                timestamp,
            )?;
        }
        self.book.record_account_order(&order.account_id, &order.order_id)?;

        let lock = self.match_lock(&order.symbol);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // FOK proves full fillability before any fill is emitted.
        if order.time_in_force == TimeInForce::Fok && !fillability::fully_fillable(&self.book, &order)? {
            drop(guard);
            self.ledger.release_for_order(&order.order_id, timestamp)?;
            order.status = OrderStatus::Rejected;
            order.updated_at = timestamp;
            self.book.persist(&order)?;
            info!(order_id = %order.order_id, symbol = %order.symbol, "FOK order rejected as not fillable");
            self.publish_notification(
                EventBody::Error {
                    message: format!("Order {} rejected: {}", order.order_id, OesError::NotFillable),
                },
                timestamp,
            );
            self.publish_orders_updated(timestamp);
            return Ok(order);
        }

        self.match_incoming(&mut order, timestamp)?;

        // Remainder handling by time in force.
        if order.remaining_quantity.is_zero() {
            self.ledger.release_for_order(&order.order_id, timestamp)?;
            self.book.persist(&order)?;
        } else if order.order_type == OrderType::Limit
            && matches!(order.time_in_force, TimeInForce::Day | TimeInForce::Gtc)
        {
            order.status = if order.has_fills() {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            };
            self.book.insert(&order)?;
        } else {
            // IOC and market remainders cancel.
            order.cancel(timestamp);
            self.ledger.release_for_order(&order.order_id, timestamp)?;
            self.book.persist(&order)?;
        }
        drop(guard);

        self.publish_book_update(&order.symbol, timestamp);
        self.publish_orders_updated(timestamp);
        Ok(order)
    }

    /// One matching loop for an incoming order. Caller holds the
    /// symbol's match lock.
    fn match_incoming(&self, order: &mut Order, timestamp: i64) -> Result<Vec<Trade>, OesError> {
        let mut trades = Vec::new();
        let mut retries = 0u32;

        while !order.remaining_quantity.is_zero() {
            let Some(resting) = self.best_crossing_opposite(order)? else {
                break;
            };
            let fill_qty = order.remaining_quantity.min(resting.remaining_quantity);
            let fill_price = resting
                .price
                .ok_or_else(|| OesError::Internal(format!("resting order {} has no price", resting.order_id)))?;

            let consumed = match self.book.consume(&resting.order_id, fill_qty, timestamp) {
                Ok(order) => order,
                Err(OesError::Stale) => {
                    retries += 1;
                    if retries > MAX_MATCH_RETRIES {
                        return Err(OesError::Internal("matching retries exhausted".into()));
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            retries = 0;

            let trade = match order.side {
                Side::Buy => Trade::new(
                    order.symbol.clone(),
                    fill_price,
                    fill_qty,
                    order.order_id.clone(),
                    consumed.order_id.clone(),
                    order.account_id.clone(),
                    consumed.account_id.clone(),
                    consumed.venue,
                    timestamp,
                ),
                Side::Sell => Trade::new(
                    order.symbol.clone(),
                    fill_price,
                    fill_qty,
                    consumed.order_id.clone(),
                    order.order_id.clone(),
                    consumed.account_id.clone(),
                    order.account_id.clone(),
                    consumed.venue,
                    timestamp,
                ),
            };

            if let Err(err) = self.ledger.apply_fill(&trade, timestamp) {
                warn!(
                    order_id = %order.order_id,
                    resting_id = %consumed.order_id,
                    error = %err,
                    "Fill settlement failed, rolling back consume"
                );
                self.book.restore(&consumed.order_id, fill_qty, timestamp)?;
                break;
            }

            order.apply_fill(fill_qty, timestamp);
            self.record_trade(&trade, timestamp)?;
            trades.push(trade);
        }
        Ok(trades)
    }

    /// Best opposite-side resting order the incoming order crosses,
    /// dark pool first.
    fn best_crossing_opposite(&self, order: &Order) -> Result<Option<Order>, OesError> {
        let opposite = order.side.opposite();
        for venue in [Venue::Dark, Venue::Lit] {
            if let Some(resting) = self.book.peek_best(&order.symbol, opposite, venue)? {
                let resting_price = resting
                    .price
                    .ok_or_else(|| OesError::Internal(format!("resting order {} has no price", resting.order_id)))?;
                if crossing::crosses(order.side, order.price, resting_price) {
                    return Ok(Some(resting));
                }
            }
        }
        Ok(None)
    }

    // ── Amend and cancel ────────────────────────────────────────────

    /// Amend a resting order's price and/or quantity, swapping its
    /// ledger hold to match, then re-run crossing for the symbol.
    pub fn amend(
        &self,
        order_id: &OrderId,
        new_price: Option<Price>,
        new_quantity: Option<Quantity>,
        timestamp: i64,
    ) -> Result<Order, OesError> {
        let existing = self
            .book
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;
        if existing.status.is_terminal() {
            return Err(OesError::AlreadyTerminal {
                status: existing.status.as_str().to_string(),
            });
        }

        let executed = existing.executed_quantity();
        let target_quantity = new_quantity.unwrap_or(existing.original_quantity);
        if target_quantity < executed {
            return Err(OesError::InvalidAmend(format!(
                "quantity {target_quantity} is below the executed amount {executed}"
            )));
        }
        let new_remaining = target_quantity - executed;
        let effective_price = new_price.or(existing.price);

        let lock = self.match_lock(&existing.symbol);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Swap the hold before touching the book so a failed reserve
        // leaves everything as it was.
        let old_hold = self.ledger.reservation_for_order(order_id);
        self.ledger.release_for_order(order_id, timestamp)?;
        if !new_remaining.is_zero() {
            if let Err(err) = self.ledger.reserve(
                &existing.account_id,
                order_id,
                existing.side,
                &existing.symbol,
                new_remaining,
                effective_price,
                timestamp,
            ) {
                self.restore_hold(&old_hold, timestamp)?;
                return Err(err);
            }
        }

        let amended = match self.book.amend(order_id, new_price, new_quantity, timestamp) {
            Ok(order) => order,
            Err(err) => {
                self.ledger.release_for_order(order_id, timestamp)?;
                self.restore_hold(&old_hold, timestamp)?;
                return Err(err);
            }
        };
        drop(guard);

        debug!(order_id = %order_id, "Order amended");
        // The amended order may now cross.
        self.match_symbol(&amended.symbol, timestamp)?;
        self.publish_book_update(&amended.symbol, timestamp);
        self.publish_orders_updated(timestamp);

        Ok(self.book.get_order(order_id)?.unwrap_or(amended))
    }

    fn restore_hold(&self, hold: &Option<ledger::Reservation>, timestamp: i64) -> Result<(), OesError> {
        let Some(hold) = hold else { return Ok(()) };
        let quantity = Quantity::try_new(hold.remaining_quantity)
            .ok_or_else(|| OesError::Internal("negative hold quantity".into()))?;
        let price = match hold.price_per_unit {
            Some(ppu) => Some(
                Price::try_new(ppu).ok_or_else(|| OesError::Internal("invalid hold price".into()))?,
            ),
            None => None,
        };
        self.ledger
            .reserve(&hold.account_id, &hold.order_id, hold.side, &hold.symbol, quantity, price, timestamp)
            .map(|_| ())
    }

    /// Cancel an order and release its hold. Idempotent on terminal
    /// orders.
    pub fn cancel(&self, order_id: &OrderId, timestamp: i64) -> Result<CancelOutcome, OesError> {
        let existing = self
            .book
            .get_order(order_id)?
            .ok_or_else(|| OesError::UnknownOrder(order_id.to_string()))?;

        let lock = self.match_lock(&existing.symbol);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = self.book.cancel(order_id, timestamp)?;
        if let CancelOutcome::Cancelled(_) = &outcome {
            self.ledger.release_for_order(order_id, timestamp)?;
        }
        drop(guard);

        if let CancelOutcome::Cancelled(order) = &outcome {
            self.publish_book_update(&order.symbol, timestamp);
            self.publish_orders_updated(timestamp);
        }
        Ok(outcome)
    }

    // ── Book-versus-book crossing (periodic tick) ───────────────────

    /// Cross resting liquidity for one symbol until the consolidated
    /// book is uncrossed. The older resting order is the maker and sets
    /// the price.
    pub fn match_symbol(&self, symbol: &Symbol, timestamp: i64) -> Result<Vec<Trade>, OesError> {
        let lock = self.match_lock(symbol);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut trades = Vec::new();
        let mut retries = 0u32;

        for _ in 0..TICK_ROUNDS {
            let Some((bid, ask)) = self.best_crossing_pair(symbol)? else {
                break;
            };
            let fill_qty = bid.remaining_quantity.min(ask.remaining_quantity);

            let bid_seq = self.book.priority_sequence(&bid.order_id)?.unwrap_or(u64::MAX);
            let ask_seq = self.book.priority_sequence(&ask.order_id)?.unwrap_or(u64::MAX);
            let maker_price = if bid_seq <= ask_seq { bid.price } else { ask.price }
                .ok_or_else(|| OesError::Internal("resting order has no price".into()))?;
            let venue = if bid.venue == Venue::Dark || ask.venue == Venue::Dark {
                Venue::Dark
            } else {
                Venue::Lit
            };

            match self.book.consume(&ask.order_id, fill_qty, timestamp) {
                Ok(_) => {}
                Err(OesError::Stale) => {
                    retries += 1;
                    if retries > MAX_MATCH_RETRIES {
                        return Err(OesError::Internal("matching retries exhausted".into()));
                    }
                    continue;
                }
                Err(err) => return Err(err),
            }
            if let Err(err) = self.book.consume(&bid.order_id, fill_qty, timestamp) {
                self.book.restore(&ask.order_id, fill_qty, timestamp)?;
                if err == OesError::Stale {
                    retries += 1;
                    if retries > MAX_MATCH_RETRIES {
                        return Err(OesError::Internal("matching retries exhausted".into()));
                    }
                    continue;
                }
                return Err(err);
            }
            retries = 0;

            let trade = Trade::new(
                symbol.clone(),
                maker_price,
                fill_qty,
                bid.order_id.clone(),
                ask.order_id.clone(),
                bid.account_id.clone(),
                ask.account_id.clone(),
                venue,
                timestamp,
            );

            if let Err(err) = self.ledger.apply_fill(&trade, timestamp) {
                warn!(trade_id = %trade.trade_id, error = %err, "Tick settlement failed, rolling back");
                self.book.restore(&ask.order_id, fill_qty, timestamp)?;
                self.book.restore(&bid.order_id, fill_qty, timestamp)?;
                break;
            }
            self.record_trade(&trade, timestamp)?;
            trades.push(trade);
        }

        if !trades.is_empty() {
            self.publish_book_update(symbol, timestamp);
            self.publish_orders_updated(timestamp);
        }
        Ok(trades)
    }

    /// Best crossing (bid, ask) pair across venues, dark pairs first.
    fn best_crossing_pair(&self, symbol: &Symbol) -> Result<Option<(Order, Order)>, OesError> {
        const PAIRS: [(Venue, Venue); 4] = [
            (Venue::Dark, Venue::Dark),
            (Venue::Dark, Venue::Lit),
            (Venue::Lit, Venue::Dark),
            (Venue::Lit, Venue::Lit),
        ];
        for (bid_venue, ask_venue) in PAIRS {
            let Some(bid) = self.book.peek_best(symbol, Side::Buy, bid_venue)? else {
                continue;
            };
            let Some(ask) = self.book.peek_best(symbol, Side::Sell, ask_venue)? else {
                continue;
            };
            match (bid.price, ask.price) {
                (Some(bid_price), Some(ask_price)) if crossing::book_crosses(bid_price, ask_price) => {
                    return Ok(Some((bid, ask)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Periodic matching tick: cross every symbol with two-sided
    /// liquidity. Runs until the store reports unavailable.
    pub async fn run_tick(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "Matching tick started");
        loop {
            interval.tick().await;
            let symbols = match self.book.symbols() {
                Ok(symbols) => symbols,
                Err(err @ OesError::Unavailable(_)) => {
                    error!(error = %err, "Store unavailable, halting matching tick");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "Symbol scan failed");
                    continue;
                }
            };
            for symbol in symbols {
                match self.book.has_two_sided_liquidity(&symbol) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        warn!(symbol = %symbol, error = %err, "Liquidity check failed");
                        continue;
                    }
                }
                match self.match_symbol(&symbol, now_nanos()) {
                    Ok(trades) if !trades.is_empty() => {
                        debug!(symbol = %symbol, count = trades.len(), "Tick matched trades");
                    }
                    Ok(_) => {}
                    Err(err @ OesError::Unavailable(_)) => {
                        error!(error = %err, "Store unavailable, halting matching tick");
                        return;
                    }
                    Err(err) => warn!(symbol = %symbol, error = %err, "Tick matching failed"),
                }
            }
        }
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// End-of-session sweep: cancel every resting day order.
    pub fn sweep_day_orders(&self, timestamp: i64) -> Result<usize, OesError> {
        let mut swept = 0;
        for symbol in self.book.symbols()? {
            let lock = self.match_lock(&symbol);
            let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            for side in [Side::Buy, Side::Sell] {
                for venue in [Venue::Lit, Venue::Dark] {
                    for order in self.book.resting_orders(&symbol, side, venue, None)? {
                        if order.time_in_force != TimeInForce::Day {
                            continue;
                        }
                        if let CancelOutcome::Cancelled(_) = self.book.cancel(&order.order_id, timestamp)? {
                            self.ledger.release_for_order(&order.order_id, timestamp)?;
                            swept += 1;
                        }
                    }
                }
            }
            drop(guard);
            self.publish_book_update(&symbol, timestamp);
        }
        if swept > 0 {
            info!(swept, "Day-order sweep complete");
            self.publish_orders_updated(timestamp);
        }
        Ok(swept)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, OesError> {
        self.book.get_order(order_id)
    }

    /// Recent trades for a symbol, newest first.
    pub fn recent_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>, OesError> {
        trades::recent(&self.store, symbol, limit)
    }

    // ── Event publication ───────────────────────────────────────────

    fn record_trade(&self, trade: &Trade, timestamp: i64) -> Result<(), OesError> {
        trades::persist(&self.store, trade)?;
        self.last_trade_price
            .insert(trade.symbol.as_str().to_string(), trade.price.as_decimal());

        let message = format!(
            "Order matched! {} {} @ ${}",
            trade.quantity, trade.symbol, trade.price
        );
        self.publish(
            &Topic::Trades(trade.symbol.clone()),
            EventBody::Trade { data: trade.clone() },
            timestamp,
        );
        self.publish_notification(
            EventBody::TradeExecuted {
                message: message.clone(),
                trade_id: trade.trade_id.clone(),
                symbol: trade.symbol.clone(),
                price: trade.price,
                quantity: trade.quantity,
                buy_account_id: trade.buy_account_id.clone(),
                sell_account_id: trade.sell_account_id.clone(),
                toast: Toast::success("Order Matched", message),
            },
            timestamp,
        );
        debug!(trade_id = %trade.trade_id, symbol = %trade.symbol, price = %trade.price, qty = %trade.quantity, "Trade executed");
        Ok(())
    }

    fn publish_book_update(&self, symbol: &Symbol, timestamp: i64) {
        match self.book.depth(symbol, Venue::Lit, UPDATE_DEPTH) {
            Ok(depth) => self.publish(
                &Topic::Orderbook(symbol.clone()),
                EventBody::Orderbook { symbol: symbol.clone(), data: depth },
                timestamp,
            ),
            Err(err) => warn!(symbol = %symbol, error = %err, "Depth query failed"),
        }
    }

    fn publish_orders_updated(&self, timestamp: i64) {
        self.publish_notification(EventBody::OrdersUpdated, timestamp);
    }

    fn publish_notification(&self, body: EventBody, timestamp: i64) {
        self.publish(&Topic::Notifications, body, timestamp);
    }

    fn publish(&self, topic: &Topic, body: EventBody, timestamp: i64) {
        if let Err(err) = envelope::publish(&self.store, topic, &Envelope::new(body, timestamp)) {
            warn!(channel = %topic.channel(), error = %err, "Event publish failed");
        }
    }
}
