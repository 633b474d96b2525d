//! End-to-end matching scenarios
//!
//! Each test drives the full service graph (store, book, ledger,
//! engine) through the order entry path and checks book, ledger, and
//! trade effects together.

use std::sync::Arc;

use book::OrderBook;
use engine::{MatchingEngine, NewOrderRequest, RiskLimits};
use ledger::AccountLedger;
use rust_decimal::Decimal;
use store::MemoryStore;
use types::account::{AccountType, RiskLevel};
use types::ids::{AccountId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, OrderType, Side, TimeInForce, Venue};
use types::position::Position;

struct World {
    store: Arc<MemoryStore>,
    book: Arc<OrderBook>,
    ledger: Arc<AccountLedger>,
    engine: Arc<MatchingEngine>,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let book = Arc::new(OrderBook::new(store.clone()));
    let ledger = Arc::new(AccountLedger::new(store.clone()));
    let engine = Arc::new(MatchingEngine::new(
        store.clone(),
        book.clone(),
        ledger.clone(),
        RiskLimits::default(),
    ));
    World { store, book, ledger, engine }
}

fn cash_account(world: &World, balance: i64) -> AccountId {
    world
        .ledger
        .create_account("Cash", Decimal::from(balance), AccountType::Standard, RiskLevel::Medium, 0)
        .unwrap()
        .account_id
}

fn position_account(world: &World, symbol: &str, qty: i64, avg_price: i64) -> AccountId {
    let account = cash_account(world, 0);
    let mut position = Position::new(account.clone(), Symbol::new(symbol), 0);
    position.apply_buy(Decimal::from(qty), Decimal::from(avg_price), 0);
    let json = serde_json::to_string(&position).unwrap();
    world
        .store
        .hset(&format!("positions:{account}"), &[(symbol.to_string(), json)])
        .unwrap();
    account
}

fn order(
    account: &AccountId,
    side: Side,
    order_type: OrderType,
    price: Option<u64>,
    qty: u64,
    venue: Venue,
    tif: TimeInForce,
) -> NewOrderRequest {
    NewOrderRequest {
        account_id: account.clone(),
        symbol: Symbol::new("AAPL"),
        side,
        order_type,
        price: price.map(Price::from_u64),
        quantity: Quantity::from_u64(qty),
        venue,
        time_in_force: tif,
    }
}

fn limit(account: &AccountId, side: Side, price: u64, qty: u64, venue: Venue) -> NewOrderRequest {
    order(account, side, OrderType::Limit, Some(price), qty, venue, TimeInForce::Gtc)
}

#[test]
fn simple_cross_resting_order_sets_price() {
    let w = world();
    let a = cash_account(&w, 10_000);
    let b = position_account(&w, "AAPL", 10, 100);

    // A's bid rests first, then B's crossing sell arrives.
    let buy = w.engine.submit(limit(&a, Side::Buy, 150, 5, Venue::Lit), 1).unwrap();
    let sell = w.engine.submit(limit(&b, Side::Sell, 140, 5, Venue::Lit), 2).unwrap();

    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, Price::from_u64(150), "resting order's price wins");
    assert_eq!(trades[0].quantity, Quantity::from_u64(5));
    assert_eq!(trades[0].buy_order_id, buy.order_id);
    assert_eq!(trades[0].sell_order_id, sell.order_id);

    let a_account = w.ledger.get_account(&a).unwrap();
    assert_eq!(a_account.cash.total, Decimal::from(9_250));
    assert_eq!(a_account.cash.reserved, Decimal::ZERO);
    let a_position = w.ledger.get_position(&a, &Symbol::new("AAPL")).unwrap().unwrap();
    assert_eq!(a_position.quantity, Decimal::from(5));
    assert_eq!(a_position.avg_price, Decimal::from(150));

    let b_account = w.ledger.get_account(&b).unwrap();
    assert_eq!(b_account.cash.total, Decimal::from(750));
    let b_position = w.ledger.get_position(&b, &Symbol::new("AAPL")).unwrap().unwrap();
    assert_eq!(b_position.quantity, Decimal::from(5));
    assert_eq!(b_position.avg_price, Decimal::from(100), "seller keeps entry vwap");
}

#[test]
fn dark_liquidity_fills_before_lit() {
    let w = world();
    let x = position_account(&w, "AAPL", 5, 90);
    let y = position_account(&w, "AAPL", 5, 90);
    let z = cash_account(&w, 10_000);

    let lit_sell = w.engine.submit(limit(&x, Side::Sell, 100, 5, Venue::Lit), 1).unwrap();
    let dark_sell = w.engine.submit(limit(&y, Side::Sell, 100, 5, Venue::Dark), 2).unwrap();

    let buy = w.engine.submit(limit(&z, Side::Buy, 100, 5, Venue::Lit), 3).unwrap();
    assert_eq!(buy.status, OrderStatus::Filled);

    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].sell_order_id, dark_sell.order_id, "dark resting order fills first");
    assert_eq!(trades[0].venue, Venue::Dark);

    // Lit order untouched
    let lit_after = w.engine.get_order(&lit_sell.order_id).unwrap().unwrap();
    assert_eq!(lit_after.status, OrderStatus::Open);
    assert_eq!(lit_after.remaining_quantity, Quantity::from_u64(5));
}

#[test]
fn partial_fill_then_rest() {
    let w = world();
    let seller = position_account(&w, "AAPL", 3, 90);
    let buyer = cash_account(&w, 10_000);

    w.engine.submit(limit(&seller, Side::Sell, 100, 3, Venue::Lit), 1).unwrap();
    let buy = w.engine.submit(limit(&buyer, Side::Buy, 100, 10, Venue::Lit), 2).unwrap();

    assert_eq!(buy.status, OrderStatus::PartiallyFilled);
    assert_eq!(buy.remaining_quantity, Quantity::from_u64(7));

    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, Quantity::from_u64(3));

    // Remainder rests at 100
    let best = w.book.peek_best(&Symbol::new("AAPL"), Side::Buy, Venue::Lit).unwrap().unwrap();
    assert_eq!(best.order_id, buy.order_id);
    assert_eq!(best.remaining_quantity, Quantity::from_u64(7));
}

#[test]
fn ioc_cancels_remainder() {
    let w = world();
    let seller = position_account(&w, "AAPL", 3, 90);
    let buyer = cash_account(&w, 10_000);

    w.engine.submit(limit(&seller, Side::Sell, 100, 3, Venue::Lit), 1).unwrap();
    let mut request = limit(&buyer, Side::Buy, 100, 10, Venue::Lit);
    request.time_in_force = TimeInForce::Ioc;
    let buy = w.engine.submit(request, 2).unwrap();

    assert_eq!(buy.status, OrderStatus::Cancelled);
    assert_eq!(buy.remaining_quantity, Quantity::from_u64(7));

    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, Quantity::from_u64(3));

    // Not in the book
    assert!(w.book.peek_best(&Symbol::new("AAPL"), Side::Buy, Venue::Lit).unwrap().is_none());
    // The 7-share hold is gone
    assert_eq!(w.ledger.get_account(&buyer).unwrap().cash.reserved, Decimal::ZERO);
}

#[test]
fn fok_rejects_when_unfillable() {
    let w = world();
    let seller = position_account(&w, "AAPL", 3, 90);
    let buyer = cash_account(&w, 10_000);

    let sell = w.engine.submit(limit(&seller, Side::Sell, 100, 3, Venue::Lit), 1).unwrap();
    let mut request = limit(&buyer, Side::Buy, 100, 10, Venue::Lit);
    request.time_in_force = TimeInForce::Fok;
    let buy = w.engine.submit(request, 2).unwrap();

    assert_eq!(buy.status, OrderStatus::Rejected);
    assert!(w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap().is_empty(), "no fills emitted");

    // Resting sell untouched
    let sell_after = w.engine.get_order(&sell.order_id).unwrap().unwrap();
    assert_eq!(sell_after.status, OrderStatus::Open);
    assert_eq!(sell_after.remaining_quantity, Quantity::from_u64(3));

    // No hold left behind
    assert_eq!(w.ledger.get_account(&buyer).unwrap().cash.reserved, Decimal::ZERO);
}

#[test]
fn fok_fills_fully_when_liquidity_suffices() {
    let w = world();
    let seller = position_account(&w, "AAPL", 10, 90);
    let buyer = cash_account(&w, 10_000);

    w.engine.submit(limit(&seller, Side::Sell, 100, 10, Venue::Lit), 1).unwrap();
    let mut request = limit(&buyer, Side::Buy, 100, 10, Venue::Lit);
    request.time_in_force = TimeInForce::Fok;
    let buy = w.engine.submit(request, 2).unwrap();

    assert_eq!(buy.status, OrderStatus::Filled);
    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, Quantity::from_u64(10));
}

#[test]
fn amend_priority_rules() {
    let w = world();
    let a = cash_account(&w, 100_000);
    let b = cash_account(&w, 100_000);

    let order_a = w.engine.submit(limit(&a, Side::Buy, 100, 5, Venue::Lit), 1).unwrap();
    let order_b = w.engine.submit(limit(&b, Side::Buy, 100, 5, Venue::Lit), 2).unwrap();

    // No-op numeric price change keeps A's priority.
    w.engine.amend(&order_a.order_id, Some(Price::from_u64(100)), None, 3).unwrap();
    let best = w.book.peek_best(&Symbol::new("AAPL"), Side::Buy, Venue::Lit).unwrap().unwrap();
    assert_eq!(best.order_id, order_a.order_id, "same-price amend preserves priority");

    // Real price change re-sequences; amending back lands behind B.
    w.engine.amend(&order_a.order_id, Some(Price::from_u64(101)), None, 4).unwrap();
    w.engine.amend(&order_a.order_id, Some(Price::from_u64(100)), None, 5).unwrap();
    let best = w.book.peek_best(&Symbol::new("AAPL"), Side::Buy, Venue::Lit).unwrap().unwrap();
    assert_eq!(best.order_id, order_b.order_id, "A lost time priority after price changes");
}

#[test]
fn market_order_with_cap_respects_bound() {
    let w = world();
    let seller = position_account(&w, "AAPL", 10, 90);
    let buyer = cash_account(&w, 10_000);

    w.engine.submit(limit(&seller, Side::Sell, 105, 5, Venue::Lit), 1).unwrap();

    // Cap at 100: the 105 ask does not cross; remainder cancels.
    let capped = w
        .engine
        .submit(order(&buyer, Side::Buy, OrderType::Market, Some(100), 5, Venue::Lit, TimeInForce::Ioc), 2)
        .unwrap();
    assert_eq!(capped.status, OrderStatus::Cancelled);
    assert!(w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap().is_empty());

    // Unprotected market order takes the 105 ask.
    let unprotected = w
        .engine
        .submit(order(&buyer, Side::Buy, OrderType::Market, None, 5, Venue::Lit, TimeInForce::Ioc), 3)
        .unwrap();
    assert_eq!(unprotected.status, OrderStatus::Filled);
    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    assert_eq!(trades[0].price, Price::from_u64(105));
}

#[test]
fn no_crossed_book_after_quiesce() {
    let w = world();
    let seller = position_account(&w, "AAPL", 50, 90);
    let buyer = cash_account(&w, 100_000);

    for (price, qty) in [(98u64, 5u64), (99, 5), (100, 5)] {
        w.engine.submit(limit(&buyer, Side::Buy, price, qty, Venue::Lit), 1).unwrap();
    }
    for (price, qty) in [(100u64, 5u64), (101, 5), (102, 5)] {
        w.engine.submit(limit(&seller, Side::Sell, price, qty, Venue::Lit), 2).unwrap();
    }
    w.engine.match_symbol(&Symbol::new("AAPL"), 3).unwrap();

    let best_bid = w.book.peek_best(&Symbol::new("AAPL"), Side::Buy, Venue::Lit).unwrap();
    let best_ask = w.book.peek_best(&Symbol::new("AAPL"), Side::Sell, Venue::Lit).unwrap();
    if let (Some(bid), Some(ask)) = (&best_bid, &best_ask) {
        assert!(bid.price.unwrap() < ask.price.unwrap(), "book must be uncrossed after quiesce");
    }
}

/// Restore a snapshot into a fresh service graph, as a restarted
/// process would, and reconcile holds against the resting orders.
fn restart_from(snapshot: &store::StoreSnapshot) -> World {
    let store = Arc::new(MemoryStore::new());
    store.restore(snapshot).unwrap();
    let book = Arc::new(OrderBook::new(store.clone()));
    let ledger = Arc::new(AccountLedger::new(store.clone()));
    let engine = Arc::new(MatchingEngine::new(
        store.clone(),
        book.clone(),
        ledger.clone(),
        RiskLimits::default(),
    ));
    let resting = book.all_resting_orders().unwrap();
    ledger.rebuild_reservations(&resting, 100).unwrap();
    World { store, book, ledger, engine }
}

#[test]
fn restart_keeps_resting_orders_fillable() {
    let w = world();
    let buyer = cash_account(&w, 10_000);
    let buy = w.engine.submit(limit(&buyer, Side::Buy, 150, 5, Venue::Lit), 1).unwrap();
    let snapshot = w.store.snapshot();

    let restarted = restart_from(&snapshot);

    // The hold survived the restart and reconciles with the order.
    let account = restarted.ledger.get_account(&buyer).unwrap();
    assert_eq!(account.cash.reserved, Decimal::from(750));
    let hold = restarted.ledger.reservation_for_order(&buy.order_id).unwrap();
    assert_eq!(hold.remaining_quantity, Decimal::from(5));

    // A crossing sell fills the restored order at its resting price.
    let seller = position_account(&restarted, "AAPL", 10, 100);
    let sell = restarted
        .engine
        .submit(limit(&seller, Side::Sell, 150, 5, Venue::Lit), 101)
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);

    let account = restarted.ledger.get_account(&buyer).unwrap();
    assert_eq!(account.cash.total, Decimal::from(9_250));
    assert_eq!(account.cash.reserved, Decimal::ZERO, "hold settled by the fill");
    let buy_after = restarted.engine.get_order(&buy.order_id).unwrap().unwrap();
    assert_eq!(buy_after.status, OrderStatus::Filled);
}

#[test]
fn restart_with_cleared_orders_frees_stale_holds() {
    let w = world();
    let buyer = cash_account(&w, 10_000);
    w.engine.submit(limit(&buyer, Side::Buy, 150, 5, Venue::Lit), 1).unwrap();
    let snapshot = w.store.snapshot();

    // Model a fresh start: the snapshot restores accounts with their
    // holds, then the startup clear wipes orders and books before the
    // rebuild runs.
    let store = Arc::new(MemoryStore::new());
    store.restore(&snapshot).unwrap();
    for pattern in ["order:*", "book:*", "acct-orders:*", "trade:*", "trades:*"] {
        store.clear(pattern).unwrap();
    }
    let book = Arc::new(OrderBook::new(store.clone()));
    let ledger = Arc::new(AccountLedger::new(store.clone()));
    let resting = book.all_resting_orders().unwrap();
    assert!(resting.is_empty());
    ledger.rebuild_reservations(&resting, 100).unwrap();

    // No order justifies the hold anymore, so the cash is available again.
    let account = ledger.get_account(&buyer).unwrap();
    assert_eq!(account.cash.reserved, Decimal::ZERO);
    assert_eq!(account.cash.available, Decimal::from(10_000));
}

#[test]
fn cancel_is_idempotent_end_to_end() {
    let w = world();
    let buyer = cash_account(&w, 10_000);
    let order = w.engine.submit(limit(&buyer, Side::Buy, 100, 5, Venue::Lit), 1).unwrap();

    let first = w.engine.cancel(&order.order_id, 2).unwrap();
    assert!(matches!(first, book::CancelOutcome::Cancelled(_)));
    let second = w.engine.cancel(&order.order_id, 3).unwrap();
    assert!(matches!(second, book::CancelOutcome::AlreadyTerminal(_)));
}

#[test]
fn fill_sum_never_exceeds_original_quantity() {
    let w = world();
    let seller = position_account(&w, "AAPL", 20, 90);
    let buyer = cash_account(&w, 100_000);

    for _ in 0..4 {
        w.engine.submit(limit(&seller, Side::Sell, 100, 5, Venue::Lit), 1).unwrap();
    }
    let buy = w.engine.submit(limit(&buyer, Side::Buy, 100, 12, Venue::Lit), 2).unwrap();
    assert_eq!(buy.status, OrderStatus::Filled);

    let trades = w.engine.recent_trades(&Symbol::new("AAPL"), 10).unwrap();
    let total: Decimal = trades
        .iter()
        .filter(|t| t.buy_order_id == buy.order_id)
        .map(|t| t.quantity.as_decimal())
        .sum();
    assert_eq!(total, Decimal::from(12));
    for trade in &trades {
        assert!(trade.quantity.as_decimal() > Decimal::ZERO);
    }
}
