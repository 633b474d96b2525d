//! HTTP route table

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, market, orders, ws};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/edit", post(orders::edit_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orderbook/:symbol", get(market::get_orderbook))
        .route("/trades/:symbol", get(market::get_recent_trades))
        .route("/accounts", get(accounts::list_accounts).post(accounts::create_account))
        .route("/accounts/:id", get(accounts::get_account))
        .route("/accounts/:id/positions", get(accounts::get_positions))
        .route(
            "/accounts/:id/transactions",
            get(accounts::get_transactions).post(accounts::post_transaction),
        )
        .route("/accounts/:id/orders", get(accounts::get_orders))
        .route("/status", get(market::get_status))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
