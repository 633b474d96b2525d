//! Order book depth, recent trades, and system status

use axum::extract::{Path, Query, State};
use axum::Json;
use book::DepthSnapshot;
use types::errors::OesError;
use types::ids::Symbol;
use types::order::Venue;
use types::time::now_nanos;
use types::trade::Trade;

use crate::error::AppError;
use crate::models::{OrderbookQuery, StatusResponse, TradesQuery};
use crate::state::AppState;

pub async fn get_orderbook(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<DepthSnapshot>, AppError> {
    let symbol = Symbol::try_new(&symbol)
        .ok_or_else(|| OesError::Validation(format!("invalid symbol: {symbol}")))?;
    let venue = query.venue.unwrap_or(Venue::Lit);
    Ok(Json(state.book.depth(&symbol, venue, query.depth)?))
}

pub async fn get_recent_trades(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<Trade>>, AppError> {
    let symbol = Symbol::try_new(&symbol)
        .ok_or_else(|| OesError::Validation(format!("invalid symbol: {symbol}")))?;
    Ok(Json(state.engine.recent_trades(&symbol, query.limit)?))
}

pub async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        timestamp: now_nanos(),
    })
}
