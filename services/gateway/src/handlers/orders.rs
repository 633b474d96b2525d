//! Order entry, amendment, and cancellation

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use book::CancelOutcome;
use types::errors::OesError;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Order;
use types::time::now_nanos;

use crate::error::AppError;
use crate::models::{CreateOrderRequest, EditOrderRequest, OrderResponse};
use crate::state::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let started = Instant::now();
    let request = payload.into_engine_request()?;
    let order = state.engine.submit(request, now_nanos())?;

    Ok(Json(OrderResponse {
        order_id: order.order_id,
        status: order.status,
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order_id = OrderId::from_string(id.as_str());
    let order = state
        .engine
        .get_order(&order_id)?
        .ok_or(OesError::UnknownOrder(id))?;
    Ok(Json(order))
}

pub async fn edit_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EditOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let started = Instant::now();
    let order_id = OrderId::from_string(id.as_str());

    let price = match payload.price {
        Some(raw) => Some(
            Price::try_new(raw).ok_or_else(|| OesError::Validation("price must be positive".into()))?,
        ),
        None => None,
    };
    let quantity = match payload.quantity {
        Some(raw) => Some(
            Quantity::try_new(raw)
                .ok_or_else(|| OesError::Validation("quantity cannot be negative".into()))?,
        ),
        None => None,
    };

    let order = state.engine.amend(&order_id, price, quantity, now_nanos())?;
    Ok(Json(OrderResponse {
        order_id: order.order_id,
        status: order.status,
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let started = Instant::now();
    let order_id = OrderId::from_string(id.as_str());

    let order = match state.engine.cancel(&order_id, now_nanos())? {
        CancelOutcome::Cancelled(order) => order,
        CancelOutcome::AlreadyTerminal(order) => order,
    };
    Ok(Json(OrderResponse {
        order_id: order.order_id,
        status: order.status,
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}
