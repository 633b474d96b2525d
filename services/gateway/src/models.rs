//! Request and response models

use engine::NewOrderRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::account::{AccountType, RiskLevel};
use types::errors::OesError;
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, OrderType, Side, TimeInForce, Venue};

/// Body of `POST /orders`
///
/// `type` carries the side; numeric fields accept JSON numbers or
/// strings. Optional fields fall back to a lit limit order good till
/// cancel.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "type")]
    pub side: Side,
    pub symbol: String,
    pub account_id: AccountId,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub tif: Option<TimeInForce>,
    #[serde(default)]
    pub venue: Option<Venue>,
}

impl CreateOrderRequest {
    pub fn into_engine_request(self) -> Result<NewOrderRequest, OesError> {
        let symbol = Symbol::try_new(&self.symbol)
            .ok_or_else(|| OesError::Validation(format!("invalid symbol: {}", self.symbol)))?;
        let quantity = Quantity::try_new(self.quantity)
            .ok_or_else(|| OesError::Validation("quantity cannot be negative".into()))?;
        let price = match self.price {
            Some(raw) => Some(
                Price::try_new(raw).ok_or_else(|| OesError::Validation("price must be positive".into()))?,
            ),
            None => None,
        };
        Ok(NewOrderRequest {
            account_id: self.account_id,
            symbol,
            side: self.side,
            order_type: self.order_type.unwrap_or(OrderType::Limit),
            price,
            quantity,
            venue: self.venue.unwrap_or(Venue::Lit),
            time_in_force: self.tif.unwrap_or(TimeInForce::Gtc),
        })
    }
}

/// Response of order entry, edit, and cancel
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub latency_ms: u64,
}

/// Body of `POST /orders/{id}/edit`
#[derive(Debug, Clone, Deserialize)]
pub struct EditOrderRequest {
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

/// Body of `POST /accounts`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub initial_balance: Decimal,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
}

/// Body of `POST /accounts/{id}/transactions`
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub amount: Decimal,
    pub transaction_type: String,
    #[serde(default)]
    pub description: String,
}

/// Query of `GET /orderbook/{symbol}`
#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookQuery {
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub venue: Option<Venue>,
}

fn default_depth() -> usize {
    10
}

/// Query of `GET /trades/{symbol}`
#[derive(Debug, Clone, Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_trade_limit")]
    pub limit: usize,
}

fn default_trade_limit() -> usize {
    20
}

/// Response of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_order_request_defaults() {
        let json = r#"{"type":"buy","symbol":"aapl","account_id":"acc-1","quantity":5,"price":150}"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        let engine_request = request.into_engine_request().unwrap();

        assert_eq!(engine_request.symbol.as_str(), "AAPL");
        assert_eq!(engine_request.order_type, OrderType::Limit);
        assert_eq!(engine_request.venue, Venue::Lit);
        assert_eq!(engine_request.time_in_force, TimeInForce::Gtc);
        assert_eq!(engine_request.price, Some(Price::from_u64(150)));
    }

    #[test]
    fn test_market_order_without_price() {
        let json = r#"{"type":"sell","symbol":"AAPL","account_id":"acc-1","quantity":"2.5","order_type":"market","tif":"ioc"}"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        let engine_request = request.into_engine_request().unwrap();

        assert_eq!(engine_request.order_type, OrderType::Market);
        assert_eq!(engine_request.price, None);
        assert_eq!(engine_request.time_in_force, TimeInForce::Ioc);
    }

    #[test]
    fn test_dark_venue_selection() {
        let json = r#"{"type":"buy","symbol":"AAPL","account_id":"acc-1","quantity":1,"price":100,"venue":"dark"}"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.into_engine_request().unwrap().venue, Venue::Dark);
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        let json = r#"{"type":"buy","symbol":"not a symbol","account_id":"acc-1","quantity":1,"price":100}"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.into_engine_request().unwrap_err().code(), "VALIDATION");
    }

    #[test]
    fn test_negative_price_rejected() {
        let json = r#"{"type":"buy","symbol":"AAPL","account_id":"acc-1","quantity":1,"price":-5}"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.into_engine_request().unwrap_err().code(), "VALIDATION");
    }
}
