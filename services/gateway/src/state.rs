//! Shared application state

use std::sync::Arc;

use book::OrderBook;
use engine::MatchingEngine;
use feed::{EventBus, SessionRegistry};
use ledger::AccountLedger;
use store::MemoryStore;

use crate::config::Config;

/// The service graph, constructed once at startup and handed by
/// reference into request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub book: Arc<OrderBook>,
    pub ledger: Arc<AccountLedger>,
    pub engine: Arc<MatchingEngine>,
    pub bus: Arc<EventBus>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}
