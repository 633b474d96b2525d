//! Account record codec
//!
//! Accounts persist as flat string-field hashes under `account:{id}`,
//! with the cash balance flattened into `balance_*` fields. Positions
//! and transactions are stored as JSON documents (one hash field per
//! symbol, one list entry per transaction) and go through serde
//! directly.

use std::collections::HashMap;

use rust_decimal::Decimal;
use std::str::FromStr;
use types::account::{Account, AccountType, CashBalance, RiskLevel};
use types::errors::OesError;
use types::ids::AccountId;

pub fn account_to_fields(account: &Account) -> Vec<(String, String)> {
    vec![
        ("account_id".into(), account.account_id.to_string()),
        ("name".into(), account.name.clone()),
        ("balance_total".into(), account.cash.total.to_string()),
        ("balance_available".into(), account.cash.available.to_string()),
        ("balance_reserved".into(), account.cash.reserved.to_string()),
        ("account_type".into(), enum_str(&account.account_type)),
        ("risk_level".into(), enum_str(&account.risk_level)),
        ("active".into(), account.active.to_string()),
        ("created_at".into(), account.created_at.to_string()),
        ("updated_at".into(), account.updated_at.to_string()),
    ]
}

pub fn account_from_fields(fields: &HashMap<String, String>) -> Result<Account, OesError> {
    let get = |name: &str| -> Result<&String, OesError> {
        fields
            .get(name)
            .ok_or_else(|| OesError::Internal(format!("account record missing field {name}")))
    };
    let decimal = |name: &str| -> Result<Decimal, OesError> {
        Decimal::from_str(get(name)?)
            .map_err(|_| OesError::Internal(format!("corrupt account field {name}")))
    };
    let int = |name: &str| -> Result<i64, OesError> {
        get(name)?
            .parse()
            .map_err(|_| OesError::Internal(format!("corrupt account field {name}")))
    };

    Ok(Account {
        account_id: AccountId::from_string(get("account_id")?.as_str()),
        name: get("name")?.clone(),
        cash: CashBalance {
            total: decimal("balance_total")?,
            available: decimal("balance_available")?,
            reserved: decimal("balance_reserved")?,
        },
        account_type: enum_from_str(get("account_type")?)?,
        risk_level: enum_from_str(get("risk_level")?)?,
        active: get("active")? == "true",
        created_at: int("created_at")?,
        updated_at: int("updated_at")?,
    })
}

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    // Enums serialize to a bare JSON string; strip the quotes.
    serde_json::to_string(value)
        .expect("enum serializes")
        .trim_matches('"')
        .to_string()
}

fn enum_from_str<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, OesError> {
    serde_json::from_str(&format!("\"{raw}\""))
        .map_err(|_| OesError::Internal(format!("corrupt enum value {raw}")))
}
