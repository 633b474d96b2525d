//! Append-only ledger transaction records

use crate::ids::{AccountId, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Classification of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TradeBuy,
    TradeSell,
    Fee,
    Reservation,
    Release,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TradeBuy => "trade_buy",
            TransactionKind::TradeSell => "trade_sell",
            TransactionKind::Fee => "fee",
            TransactionKind::Reservation => "reservation",
            TransactionKind::Release => "release",
        }
    }
}

/// One entry in an account's transaction log
///
/// Never mutated after write. `amount` is signed; `balance_after` records
/// the account's total cash immediately after the transaction applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub timestamp: i64, // Unix nanos
}

impl Transaction {
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        balance_after: Decimal,
        description: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            kind,
            amount,
            balance_after,
            description: description.into(),
            timestamp,
        }
    }
}
