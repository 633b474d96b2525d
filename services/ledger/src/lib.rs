//! Account ledger
//!
//! Owns accounts, positions, and transaction logs, all written through
//! to the store (`account:{id}` hash, `positions:{id}` hash keyed by
//! symbol, `txn:{id}` append-only list). Reservations hold cash for
//! open buys and position units for open sells; a hold is released on
//! cancel/reject or settled proportionally as fills arrive, and is
//! never orphaned: every failure path between reserve and book insert
//! releases it. The registry itself is derived state; after a restart
//! `rebuild_reservations` reconstructs it from the resting order set,
//! so the store stays the single source of truth and holds always
//! reconcile with the orders that justify them.
//!
//! All mutations for one account serialize on that account's lock.
//! `apply_fill` locks both trade accounts in id order and validates
//! feasibility before writing either side, so a trade's ledger effects
//! are all-or-nothing.

pub mod codec;
pub mod reservation;

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use rust_decimal::Decimal;
use store::MemoryStore;
use tracing::{debug, info, warn};
use types::account::{Account, AccountType, RiskLevel};
use types::errors::OesError;
use types::ids::{AccountId, OrderId, ReservationId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};
use types::position::Position;
use types::trade::Trade;
use types::transaction::{Transaction, TransactionKind};

pub use reservation::{Reservation, ReservationRegistry};

fn account_key(account_id: &AccountId) -> String {
    format!("account:{account_id}")
}

fn positions_key(account_id: &AccountId) -> String {
    format!("positions:{account_id}")
}

fn txn_key(account_id: &AccountId) -> String {
    format!("txn:{account_id}")
}

/// The account ledger service
pub struct AccountLedger {
    store: Arc<MemoryStore>,
    account_locks: DashMap<String, Arc<Mutex<()>>>,
    reservations: ReservationRegistry,
}

impl AccountLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            account_locks: DashMap::new(),
            reservations: ReservationRegistry::default(),
        }
    }

    fn account_lock(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account_id.to_string())
            .or_default()
            .clone()
    }

    fn load_account(&self, account_id: &AccountId) -> Result<Account, OesError> {
        let fields = self.store.hgetall(&account_key(account_id))?;
        if fields.is_empty() {
            return Err(OesError::UnknownAccount(account_id.to_string()));
        }
        codec::account_from_fields(&fields)
    }

    fn save_account(&self, account: &Account) -> Result<(), OesError> {
        self.store
            .hset(&account_key(&account.account_id), &codec::account_to_fields(account))?;
        Ok(())
    }

    fn record_transaction(&self, txn: Transaction) -> Result<Transaction, OesError> {
        let json = serde_json::to_string(&txn)
            .map_err(|e| OesError::Internal(format!("transaction serialization: {e}")))?;
        self.store.lpush(&txn_key(&txn.account_id), &json)?;
        Ok(txn)
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Create an account and record its opening deposit.
    pub fn create_account(
        &self,
        name: &str,
        initial_balance: Decimal,
        account_type: AccountType,
        risk_level: RiskLevel,
        timestamp: i64,
    ) -> Result<Account, OesError> {
        if name.trim().is_empty() {
            return Err(OesError::Validation("account name cannot be empty".into()));
        }
        if initial_balance < Decimal::ZERO {
            return Err(OesError::Validation("initial balance cannot be negative".into()));
        }

        let account = Account::new(name.trim(), initial_balance, account_type, risk_level, timestamp);
        self.save_account(&account)?;
        self.record_transaction(Transaction::new(
            account.account_id.clone(),
            TransactionKind::Deposit,
            initial_balance,
            account.cash.total,
            "Initial account funding",
            timestamp,
        ))?;

        info!(account_id = %account.account_id, name = %account.name, balance = %initial_balance, "Created account");
        Ok(account)
    }

    pub fn get_account(&self, account_id: &AccountId) -> Result<Account, OesError> {
        self.load_account(account_id)
    }

    /// All accounts, ordered by id.
    pub fn list_accounts(&self) -> Result<Vec<Account>, OesError> {
        let mut accounts = Vec::new();
        for key in self.store.keys("account:*")? {
            let fields = self.store.hgetall(&key)?;
            if !fields.is_empty() {
                accounts.push(codec::account_from_fields(&fields)?);
            }
        }
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(accounts)
    }

    /// Deactivate an account. Accounts are never deleted.
    pub fn deactivate_account(&self, account_id: &AccountId, timestamp: i64) -> Result<Account, OesError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.load_account(account_id)?;
        account.active = false;
        account.updated_at = timestamp;
        self.save_account(&account)?;
        Ok(account)
    }

    /// Seed demo accounts when the store holds none.
    pub fn seed_sample_accounts(&self, timestamp: i64) -> Result<Vec<Account>, OesError> {
        if !self.list_accounts()?.is_empty() {
            return Ok(Vec::new());
        }
        let samples: &[(&str, i64, AccountType, RiskLevel)] = &[
            ("Trading Account 1", 1_000_000, AccountType::Institutional, RiskLevel::High),
            ("Trading Account 2", 500_000, AccountType::Standard, RiskLevel::Medium),
            ("Trading Account 3", 250_000, AccountType::Standard, RiskLevel::Low),
            ("Trading Account 4", 100_000, AccountType::Personal, RiskLevel::Medium),
            ("Trading Account 5", 50_000, AccountType::Personal, RiskLevel::Low),
        ];
        let mut created = Vec::with_capacity(samples.len());
        for (name, balance, account_type, risk_level) in samples {
            created.push(self.create_account(name, Decimal::from(*balance), *account_type, *risk_level, timestamp)?);
        }
        info!(count = created.len(), "Seeded sample accounts");
        Ok(created)
    }

    // ── Cash movements ──────────────────────────────────────────────

    /// Deposit cash into an account.
    pub fn deposit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: &str,
        timestamp: i64,
    ) -> Result<Transaction, OesError> {
        if amount <= Decimal::ZERO {
            return Err(OesError::Validation("deposit amount must be positive".into()));
        }
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.load_account(account_id)?;
        account.cash.credit(amount);
        account.updated_at = timestamp;
        self.save_account(&account)?;

        self.record_transaction(Transaction::new(
            account_id.clone(),
            TransactionKind::Deposit,
            amount,
            account.cash.total,
            description,
            timestamp,
        ))
    }

    /// Withdraw available cash from an account.
    pub fn withdraw(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: &str,
        timestamp: i64,
    ) -> Result<Transaction, OesError> {
        if amount <= Decimal::ZERO {
            return Err(OesError::Validation("withdrawal amount must be positive".into()));
        }
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.load_account(account_id)?;
        if account.cash.available < amount {
            return Err(OesError::InsufficientFunds {
                required: amount,
                available: account.cash.available,
            });
        }
        account.cash.debit(amount);
        account.updated_at = timestamp;
        self.save_account(&account)?;

        self.record_transaction(Transaction::new(
            account_id.clone(),
            TransactionKind::Withdrawal,
            -amount,
            account.cash.total,
            description,
            timestamp,
        ))
    }

    // ── Reservations ────────────────────────────────────────────────

    /// Place a hold backing an order entering the book.
    ///
    /// Buys hold `quantity × price` cash (`price` is the limit or the
    /// market protection cap). Sells hold position units; selling more
    /// than the available position requires a high-risk account.
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        &self,
        account_id: &AccountId,
        order_id: &OrderId,
        side: Side,
        symbol: &Symbol,
        quantity: Quantity,
        price: Option<Price>,
        timestamp: i64,
    ) -> Result<ReservationId, OesError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.load_account(account_id)?;
        if !account.active {
            return Err(OesError::Validation("account is not active".into()));
        }
        let qty = quantity.as_decimal();

        let (price_per_unit, description) = match side {
            Side::Buy => {
                let price = price.ok_or_else(|| {
                    OesError::Internal("buy reservation requires a price".into())
                })?;
                let required = qty * price.as_decimal();
                if account.cash.available < required {
                    return Err(OesError::InsufficientFunds {
                        required,
                        available: account.cash.available,
                    });
                }
                account.cash.reserve(required);
                account.updated_at = timestamp;
                self.save_account(&account)?;
                (
                    Some(price.as_decimal()),
                    format!("Reserve ${required} for buy {quantity} {symbol} @ ${price}"),
                )
            }
            Side::Sell => {
                let mut position = self
                    .get_position(account_id, symbol)?
                    .unwrap_or_else(|| Position::new(account_id.clone(), symbol.clone(), timestamp));
                if !account.may_short() && position.available() < qty {
                    return Err(OesError::InsufficientPosition {
                        symbol: symbol.to_string(),
                        required: qty,
                        available: position.available(),
                    });
                }
                position.reserved += qty;
                position.updated_at = timestamp;
                self.save_position(&position)?;
                (None, format!("Reserve {quantity} {symbol} for sell"))
            }
        };

        self.record_transaction(Transaction::new(
            account_id.clone(),
            TransactionKind::Reservation,
            Decimal::ZERO,
            account.cash.total,
            description,
            timestamp,
        ))?;

        let reservation = Reservation {
            id: ReservationId::new(),
            account_id: account_id.clone(),
            order_id: order_id.clone(),
            side,
            symbol: symbol.clone(),
            remaining_quantity: qty,
            price_per_unit,
        };
        debug!(order_id = %order_id, reservation_id = %reservation.id, "Placed reservation");
        Ok(self.reservations.insert(reservation))
    }

    /// Undo a reservation. Idempotent: releasing an unknown or already
    /// released hold is a no-op.
    pub fn release(&self, reservation_id: &ReservationId, timestamp: i64) -> Result<(), OesError> {
        let Some(reservation) = self.reservations.remove(reservation_id) else {
            return Ok(());
        };
        self.release_hold(&reservation, timestamp)
    }

    /// Release whatever hold an order still has, if any.
    pub fn release_for_order(&self, order_id: &OrderId, timestamp: i64) -> Result<(), OesError> {
        if let Some(reservation) = self.reservations.get_by_order(order_id) {
            self.reservations.remove(&reservation.id);
            self.release_hold(&reservation, timestamp)?;
        }
        Ok(())
    }

    /// The live hold backing an order, if any.
    pub fn reservation_for_order(&self, order_id: &OrderId) -> Option<Reservation> {
        self.reservations.get_by_order(order_id)
    }

    fn release_hold(&self, reservation: &Reservation, timestamp: i64) -> Result<(), OesError> {
        let lock = self.account_lock(&reservation.account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.load_account(&reservation.account_id)?;
        let description = match reservation.side {
            Side::Buy => {
                let held = reservation.held_cash();
                account.cash.release(held);
                account.updated_at = timestamp;
                self.save_account(&account)?;
                format!("Release ${held} hold on {}", reservation.symbol)
            }
            Side::Sell => {
                if let Some(mut position) = self.get_position(&reservation.account_id, &reservation.symbol)? {
                    position.reserved = (position.reserved - reservation.remaining_quantity).max(Decimal::ZERO);
                    position.updated_at = timestamp;
                    self.save_position(&position)?;
                }
                format!("Release {} {} hold", reservation.remaining_quantity, reservation.symbol)
            }
        };

        self.record_transaction(Transaction::new(
            reservation.account_id.clone(),
            TransactionKind::Release,
            Decimal::ZERO,
            account.cash.total,
            description,
            timestamp,
        ))?;
        debug!(order_id = %reservation.order_id, "Released reservation");
        Ok(())
    }

    /// Rebuild the reservation registry from the resting order set.
    ///
    /// The registry does not survive a restart, but the holds it backs
    /// do: restored accounts still carry `reserved` cash and positions
    /// still carry reserved units. This pass zeroes every hold and then
    /// re-places one per resting order (side, price, and remaining
    /// quantity are all on the order record), so a hold exists iff an
    /// order justifies it. Holds left behind by orders that no longer
    /// rest (e.g. wiped by the startup clear) return to available.
    ///
    /// Runs at startup, before any traffic. Returns how many holds were
    /// re-placed.
    pub fn rebuild_reservations(&self, resting_orders: &[Order], timestamp: i64) -> Result<usize, OesError> {
        self.reservations.clear();

        // Zero every cash hold.
        for mut account in self.list_accounts()? {
            if account.cash.reserved != Decimal::ZERO {
                let held = account.cash.reserved;
                account.cash.release(held);
                account.updated_at = timestamp;
                self.save_account(&account)?;
            }
        }
        // Zero every position hold.
        for key in self.store.keys("positions:*")? {
            for json in self.store.hgetall(&key)?.values() {
                let mut position: Position = serde_json::from_str(json)
                    .map_err(|e| OesError::Internal(format!("corrupt position record: {e}")))?;
                if position.reserved != Decimal::ZERO {
                    position.reserved = Decimal::ZERO;
                    position.updated_at = timestamp;
                    self.save_position(&position)?;
                }
            }
        }

        // Re-place one hold per resting order.
        let mut rebuilt = 0;
        for order in resting_orders {
            if !order.status.is_resting() || order.remaining_quantity.is_zero() {
                continue;
            }
            let price = match order.side {
                Side::Buy => order.price,
                Side::Sell => None,
            };
            match self.reserve(
                &order.account_id,
                &order.order_id,
                order.side,
                &order.symbol,
                order.remaining_quantity,
                price,
                timestamp,
            ) {
                Ok(_) => rebuilt += 1,
                Err(err) => warn!(
                    order_id = %order.order_id,
                    account_id = %order.account_id,
                    error = %err,
                    "Could not rebuild hold for resting order"
                ),
            }
        }
        info!(rebuilt, resting = resting_orders.len(), "Reservation registry rebuilt");
        Ok(rebuilt)
    }

    // ── Settlement ──────────────────────────────────────────────────

    /// Settle one trade against both accounts.
    ///
    /// Validates feasibility before mutating either side: a trade's
    /// ledger effects either fully apply or fully fail, so the caller
    /// can roll the book back on error.
    pub fn apply_fill(&self, trade: &Trade, timestamp: i64) -> Result<(), OesError> {
        let qty = trade.quantity.as_decimal();
        let price = trade.price.as_decimal();
        let cost = trade.trade_value();

        let buy_res = self.reservations.get_by_order(&trade.buy_order_id);
        let sell_res = self.reservations.get_by_order(&trade.sell_order_id);

        // Lock both accounts in id order.
        let (first, second) = if trade.buy_account_id <= trade.sell_account_id {
            (&trade.buy_account_id, &trade.sell_account_id)
        } else {
            (&trade.sell_account_id, &trade.buy_account_id)
        };
        let lock_first = self.account_lock(first);
        let lock_second = self.account_lock(second);
        let _guard_first = lock_first.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard_second = if first != second {
            Some(lock_second.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            None
        };

        // Feasibility checks before any write.
        let buyer = self.load_account(&trade.buy_account_id)?;
        self.load_account(&trade.sell_account_id)?;
        let buy_release = buy_res
            .as_ref()
            .map(|r| qty.min(r.remaining_quantity) * r.price_per_unit.unwrap_or(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO);
        if buyer.cash.available + buy_release < cost {
            return Err(OesError::InsufficientFunds {
                required: cost,
                available: buyer.cash.available + buy_release,
            });
        }

        // Buyer: release the proportional hold, pay, take the position.
        {
            let mut buyer = self.load_account(&trade.buy_account_id)?;
            if let Some(res) = &buy_res {
                buyer.cash.release(buy_release);
                self.reservations.consume(&res.id, qty);
            }
            buyer.cash.debit(cost);
            buyer.updated_at = timestamp;
            self.save_account(&buyer)?;

            let mut position = self
                .get_position(&trade.buy_account_id, &trade.symbol)?
                .unwrap_or_else(|| Position::new(trade.buy_account_id.clone(), trade.symbol.clone(), timestamp));
            position.apply_buy(qty, price, timestamp);
            self.save_position(&position)?;

            self.record_transaction(Transaction::new(
                trade.buy_account_id.clone(),
                TransactionKind::TradeBuy,
                -cost,
                buyer.cash.total,
                format!("Buy {} {} @ ${}", trade.quantity, trade.symbol, trade.price),
                timestamp,
            ))?;
        }

        // Seller: release reserved units, give up the position, collect.
        {
            let mut seller = self.load_account(&trade.sell_account_id)?;
            seller.cash.credit(cost);
            seller.updated_at = timestamp;
            self.save_account(&seller)?;

            let mut position = self
                .get_position(&trade.sell_account_id, &trade.symbol)?
                .unwrap_or_else(|| Position::new(trade.sell_account_id.clone(), trade.symbol.clone(), timestamp));
            if sell_res.is_some() {
                position.reserved = (position.reserved - qty).max(Decimal::ZERO);
            }
            position.apply_sell(qty, price, timestamp);
            self.save_position(&position)?;
            if let Some(res) = &sell_res {
                self.reservations.consume(&res.id, qty);
            }

            self.record_transaction(Transaction::new(
                trade.sell_account_id.clone(),
                TransactionKind::TradeSell,
                cost,
                seller.cash.total,
                format!("Sell {} {} @ ${}", trade.quantity, trade.symbol, trade.price),
                timestamp,
            ))?;
        }

        debug!(trade_id = %trade.trade_id, symbol = %trade.symbol, qty = %trade.quantity, price = %trade.price, "Settled trade");
        Ok(())
    }

    // ── Positions and transactions ──────────────────────────────────

    pub fn get_position(&self, account_id: &AccountId, symbol: &Symbol) -> Result<Option<Position>, OesError> {
        let raw = self.store.hget(&positions_key(account_id), symbol.as_str())?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| OesError::Internal(format!("corrupt position record: {e}"))),
            None => Ok(None),
        }
    }

    fn save_position(&self, position: &Position) -> Result<(), OesError> {
        let json = serde_json::to_string(position)
            .map_err(|e| OesError::Internal(format!("position serialization: {e}")))?;
        self.store.hset(
            &positions_key(&position.account_id),
            &[(position.symbol.as_str().to_string(), json)],
        )?;
        Ok(())
    }

    /// All positions for an account, ordered by symbol.
    pub fn positions(&self, account_id: &AccountId) -> Result<Vec<Position>, OesError> {
        let raw = self.store.hgetall(&positions_key(account_id))?;
        let mut positions = Vec::with_capacity(raw.len());
        for json in raw.values() {
            positions.push(
                serde_json::from_str::<Position>(json)
                    .map_err(|e| OesError::Internal(format!("corrupt position record: {e}")))?,
            );
        }
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    /// Recent transactions for an account, newest first.
    pub fn transactions(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>, OesError> {
        let raw = self.store.lrange(&txn_key(account_id), 0, limit as isize - 1)?;
        raw.iter()
            .map(|json| {
                serde_json::from_str(json)
                    .map_err(|e| OesError::Internal(format!("corrupt transaction record: {e}")))
            })
            .collect()
    }
}
