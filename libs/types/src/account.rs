//! Account and cash balance types

use crate::ids::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Personal,
    Standard,
    Institutional,
}

/// Risk tolerance tier
///
/// `High` unlocks short selling; other tiers require an existing position
/// to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Cash balance split into available and reserved portions
///
/// Invariant: total = available + reserved. Reserved cash backs open buy
/// orders and is either released (cancel/reject) or settled (fill).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashBalance {
    pub total: Decimal,
    pub available: Decimal,
    pub reserved: Decimal,
}

impl CashBalance {
    pub fn new(total: Decimal) -> Self {
        Self {
            total,
            available: total,
            reserved: Decimal::ZERO,
        }
    }

    /// Check balance invariant: total = available + reserved
    pub fn check_invariant(&self) -> bool {
        self.total == self.available + self.reserved
    }

    /// Move funds from available into reserved.
    ///
    /// # Panics
    /// Panics if amount is negative or exceeds available
    pub fn reserve(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Reserve amount must be non-negative");
        assert!(amount <= self.available, "Insufficient available funds");

        self.available -= amount;
        self.reserved += amount;

        assert!(self.check_invariant(), "Invariant violated after reserve");
    }

    /// Move funds from reserved back into available.
    ///
    /// # Panics
    /// Panics if amount is negative or exceeds reserved
    pub fn release(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Release amount must be non-negative");
        assert!(amount <= self.reserved, "Insufficient reserved funds");

        self.reserved -= amount;
        self.available += amount;

        assert!(self.check_invariant(), "Invariant violated after release");
    }

    /// Spend directly from available funds (fills without a reservation).
    ///
    /// # Panics
    /// Panics if amount is negative or exceeds available
    pub fn debit(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Debit amount must be non-negative");
        assert!(amount <= self.available, "Insufficient available funds");

        self.available -= amount;
        self.total -= amount;

        assert!(self.check_invariant(), "Invariant violated after debit");
    }

    /// Add funds to available (deposit, sale proceeds).
    ///
    /// # Panics
    /// Panics if amount is negative
    pub fn credit(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "Credit amount must be non-negative");

        self.available += amount;
        self.total += amount;

        assert!(self.check_invariant(), "Invariant violated after credit");
    }
}

/// A trading account
///
/// Created by an admin call; never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub name: String,
    pub cash: CashBalance,
    pub account_type: AccountType,
    pub risk_level: RiskLevel,
    pub active: bool,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        initial_balance: Decimal,
        account_type: AccountType,
        risk_level: RiskLevel,
        timestamp: i64,
    ) -> Self {
        Self {
            account_id: AccountId::new(),
            name: name.into(),
            cash: CashBalance::new(initial_balance),
            account_type,
            risk_level,
            active: true,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Whether this account may hold a negative (short) position
    pub fn may_short(&self) -> bool {
        self.risk_level == RiskLevel::High
    }
}
