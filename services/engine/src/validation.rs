//! Pre-trade validation
//!
//! Checks incoming orders against configurable limits before any
//! reservation is taken: quantity and price bounds, and a maximum
//! deviation from the symbol's last trade price for limit orders.

use rust_decimal::Decimal;
use types::errors::OesError;
use types::numeric::{Price, Quantity};
use types::order::OrderType;

/// Order limit configuration
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub min_order_size: Decimal,
    pub max_order_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Maximum % deviation of a limit price from the last trade price.
    pub price_deviation_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            min_order_size: Decimal::new(1, 2), // 0.01
            max_order_size: Decimal::from(1_000_000),
            min_price: Decimal::new(1, 2), // 0.01
            max_price: Decimal::from(1_000_000),
            price_deviation_pct: Decimal::from(10),
        }
    }
}

/// Validate order parameters against the limits.
///
/// `last_price` is the symbol's most recent trade price, when known.
pub fn validate_order(
    order_type: OrderType,
    price: Option<Price>,
    quantity: Quantity,
    limits: &RiskLimits,
    last_price: Option<Decimal>,
) -> Result<(), OesError> {
    let qty = quantity.as_decimal();
    if qty <= Decimal::ZERO {
        return Err(OesError::Validation("order quantity must be positive".into()));
    }
    if qty < limits.min_order_size {
        return Err(OesError::Validation(format!(
            "order quantity {qty} is below minimum {}",
            limits.min_order_size
        )));
    }
    if qty > limits.max_order_size {
        return Err(OesError::Validation(format!(
            "order quantity {qty} exceeds maximum {}",
            limits.max_order_size
        )));
    }

    if order_type == OrderType::Limit && price.is_none() {
        return Err(OesError::Validation("limit orders require a price".into()));
    }

    if let Some(price) = price {
        let p = price.as_decimal();
        if p < limits.min_price {
            return Err(OesError::Validation(format!(
                "price {p} is below minimum {}",
                limits.min_price
            )));
        }
        if p > limits.max_price {
            return Err(OesError::Validation(format!(
                "price {p} exceeds maximum {}",
                limits.max_price
            )));
        }
        // Deviation guard applies to firm limit prices, not market caps.
        if order_type == OrderType::Limit {
            if let Some(last) = last_price {
                if last > Decimal::ZERO {
                    let deviation_pct = ((p - last).abs() / last) * Decimal::from(100);
                    if deviation_pct > limits.price_deviation_pct {
                        return Err(OesError::Validation(format!(
                            "price deviation {deviation_pct:.2}% exceeds maximum {}%",
                            limits.price_deviation_pct
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits::default()
    }

    #[test]
    fn test_accepts_reasonable_limit_order() {
        validate_order(
            OrderType::Limit,
            Some(Price::from_u64(150)),
            Quantity::from_u64(5),
            &limits(),
            None,
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let err = validate_order(OrderType::Limit, Some(Price::from_u64(1)), Quantity::zero(), &limits(), None)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_rejects_oversized_order() {
        let err = validate_order(
            OrderType::Limit,
            Some(Price::from_u64(1)),
            Quantity::from_u64(2_000_000),
            &limits(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_limit_requires_price() {
        let err = validate_order(OrderType::Limit, None, Quantity::from_u64(1), &limits(), None).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_market_without_price_is_fine() {
        validate_order(OrderType::Market, None, Quantity::from_u64(1), &limits(), None).unwrap();
    }

    #[test]
    fn test_price_bounds() {
        let err = validate_order(
            OrderType::Limit,
            Some(Price::from_u64(2_000_000)),
            Quantity::from_u64(1),
            &limits(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_deviation_guard_for_limit_orders() {
        let last = Some(Decimal::from(100));
        // 5% away: fine
        validate_order(OrderType::Limit, Some(Price::from_u64(105)), Quantity::from_u64(1), &limits(), last).unwrap();
        // 20% away: rejected
        let err = validate_order(OrderType::Limit, Some(Price::from_u64(120)), Quantity::from_u64(1), &limits(), last)
            .unwrap_err();
        assert!(err.to_string().contains("deviation"));
    }

    #[test]
    fn test_market_cap_skips_deviation_guard() {
        let last = Some(Decimal::from(100));
        validate_order(OrderType::Market, Some(Price::from_u64(200)), Quantity::from_u64(1), &limits(), last).unwrap();
    }
}
