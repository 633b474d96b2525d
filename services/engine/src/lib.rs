//! Matching engine service
//!
//! Continuous double-auction crossing with dual-venue preference,
//! account-aware order entry, and atomic fill settlement.
//!
//! # Modules
//! - `crossing`: price-crossing predicates
//! - `validation`: pre-trade order limits
//! - `fillability`: non-mutating FOK walk
//! - `trades`: trade persistence and recency queries
//! - `engine`: the matching engine itself

pub mod crossing;
pub mod engine;
pub mod fillability;
pub mod trades;
pub mod validation;

pub use engine::{MatchingEngine, NewOrderRequest};
pub use validation::RiskLimits;
