//! Composite sorted-set scores
//!
//! A score orders by a primary decimal component first and an insertion
//! sequence second, so members at the same primary value rank
//! oldest-first. Bid books store the negated price as the primary
//! component, which makes "best first" a single forward range scan on
//! both sides.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Composite score: (primary, sequence), ordered ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Score {
    pub primary: Decimal,
    pub sequence: u64,
}

impl Score {
    pub fn new(primary: Decimal, sequence: u64) -> Self {
        Self { primary, sequence }
    }
}
