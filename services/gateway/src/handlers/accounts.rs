//! Account administration and queries

use axum::extract::{Path, State};
use axum::Json;
use types::account::{Account, AccountType, RiskLevel};
use types::errors::OesError;
use types::ids::AccountId;
use types::order::Order;
use types::position::Position;
use types::time::now_nanos;
use types::transaction::Transaction;

use crate::error::AppError;
use crate::models::{CreateAccountRequest, TransactionRequest};
use crate::state::AppState;

const TRANSACTION_PAGE: usize = 50;

pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.ledger.list_accounts()?))
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.create_account(
        &payload.name,
        payload.initial_balance,
        payload.account_type.unwrap_or(AccountType::Standard),
        payload.risk_level.unwrap_or(RiskLevel::Medium),
        now_nanos(),
    )?;
    Ok(Json(account))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Account>, AppError> {
    let account = state.ledger.get_account(&AccountId::from_string(id.as_str()))?;
    Ok(Json(account))
}

pub async fn get_positions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Position>>, AppError> {
    let account_id = AccountId::from_string(id.as_str());
    // Surface unknown accounts instead of an empty list.
    state.ledger.get_account(&account_id)?;
    Ok(Json(state.ledger.positions(&account_id)?))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let account_id = AccountId::from_string(id.as_str());
    state.ledger.get_account(&account_id)?;
    Ok(Json(state.ledger.transactions(&account_id, TRANSACTION_PAGE)?))
}

pub async fn post_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let account_id = AccountId::from_string(id.as_str());
    let timestamp = now_nanos();

    let txn = match payload.transaction_type.as_str() {
        "deposit" => state
            .ledger
            .deposit(&account_id, payload.amount, &payload.description, timestamp)?,
        "withdrawal" => state
            .ledger
            .withdraw(&account_id, payload.amount, &payload.description, timestamp)?,
        other => {
            return Err(OesError::Validation(format!(
                "unsupported transaction type: {other}"
            ))
            .into())
        }
    };
    Ok(Json(txn))
}

pub async fn get_orders(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Order>>, AppError> {
    let account_id = AccountId::from_string(id.as_str());
    state.ledger.get_account(&account_id)?;
    Ok(Json(state.book.orders_for_account(&account_id)?))
}
