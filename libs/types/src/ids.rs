//! Opaque identifier types for system entities
//!
//! All identifiers are prefixed strings wrapping a UUID v7, so ids are
//! unique, time-sortable, and human-recognizable in logs and store keys
//! (`ord-…`, `acc-…`, `trd-…`, `txn-…`, `res-…`).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id with an embedded UUID v7 timestamp.
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::now_v7()))
            }

            /// Wrap an existing id string (e.g. read back from the store).
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for an order.
    OrderId,
    "ord"
);

string_id!(
    /// Unique identifier for a trade.
    TradeId,
    "trd"
);

string_id!(
    /// Unique identifier for a trading account.
    AccountId,
    "acc"
);

string_id!(
    /// Unique identifier for a ledger transaction.
    TransactionId,
    "txn"
);

string_id!(
    /// Unique identifier for a cash or position reservation.
    ReservationId,
    "res"
);

/// Trading symbol (uppercase ticker, e.g. "AAPL")
///
/// Normalized to uppercase on construction. Valid symbols are non-empty
/// ASCII alphanumerics plus `.` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate a symbol, returning None if invalid.
    pub fn try_new(raw: impl AsRef<str>) -> Option<Self> {
        let s = raw.as_ref().trim().to_ascii_uppercase();
        if s.is_empty() || s.len() > 16 {
            return None;
        }
        if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Construct a symbol, panicking on invalid input.
    ///
    /// # Panics
    /// Panics if the symbol is empty or contains invalid characters.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self::try_new(raw.as_ref()).expect("invalid symbol")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
