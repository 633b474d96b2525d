//! Error taxonomy shared across all services

use rust_decimal::Decimal;
use thiserror::Error;

/// Domain error with a stable machine code and a human-readable detail
///
/// `Stale` is retryable and recovered locally by the matching engine;
/// `Unavailable` halts the periodic tick; everything else surfaces to the
/// caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OesError {
    #[error("{0}")]
    Validation(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("insufficient position in {symbol}: required {required}, available {available}")]
    InsufficientPosition {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("order cannot be fully filled within its limit")]
    NotFillable,

    #[error("invalid amend: {0}")]
    InvalidAmend(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("order is already in a terminal state ({status})")]
    AlreadyTerminal { status: String },

    #[error("concurrent update lost the race")]
    Stale,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OesError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            OesError::Validation(_) => "VALIDATION",
            OesError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            OesError::InsufficientPosition { .. } => "INSUFFICIENT_POSITION",
            OesError::NotFillable => "NOT_FILLABLE",
            OesError::InvalidAmend(_) => "INVALID_AMEND",
            OesError::UnknownOrder(_) => "UNKNOWN_ORDER",
            OesError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            OesError::AlreadyTerminal { .. } => "ALREADY_TERMINAL",
            OesError::Stale => "STALE",
            OesError::Unavailable(_) => "UNAVAILABLE",
            OesError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a failed operation may be retried as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, OesError::Stale)
    }
}
