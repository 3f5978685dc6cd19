use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use ledger::catalog::Product;
use ledger::error::LedgerError;
use ledger::prices::PriceEntry;
use ledger::types::Transaction;

use crate::{AppState, middleware::AuthUser};

// Balance response: the authoritative value clients resync against
#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance: u32,
}

// Transaction history query parameters
#[derive(Deserialize)]
pub struct TransactionsRequest {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

// Spend request
#[derive(Deserialize)]
pub struct SpendRequest {
    pub action_type: String,
}

// Spend response
#[derive(Serialize)]
pub struct SpendResponse {
    pub success: bool,
    pub cost: Option<u32>,
    pub new_balance: Option<u32>,
    pub error: Option<String>,
    pub message: String,
}

// Get wallet balance endpoint. open_wallet is get-or-create, so a resync
// after a server restart still answers.
pub async fn get_wallet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> (StatusCode, Json<BalanceResponse>) {
    let wallet = state.wallets.open_wallet(&user.user_id);
    (
        StatusCode::OK,
        Json(BalanceResponse {
            balance: wallet.balance,
        }),
    )
}

// Get recent transactions endpoint, most recent first
pub async fn get_transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<TransactionsRequest>,
) -> (StatusCode, Json<TransactionsResponse>) {
    let limit = params.limit.unwrap_or(20).min(100);

    state.wallets.open_wallet(&user.user_id);
    let transactions = state
        .wallets
        .recent_transactions(&user.user_id, limit)
        .unwrap_or_default();

    (StatusCode::OK, Json(TransactionsResponse { transactions }))
}

// Spend markers on a gated action. The price always comes from the server
// table; the client never declares a cost.
pub async fn spend(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<SpendRequest>,
) -> (StatusCode, Json<SpendResponse>) {
    state.wallets.open_wallet(&user.user_id);

    match state
        .wallets
        .debit(&user.user_id, &payload.action_type, &state.prices)
    {
        Ok(receipt) => (
            StatusCode::OK,
            Json(SpendResponse {
                success: true,
                cost: Some(receipt.cost),
                new_balance: Some(receipt.new_balance),
                error: None,
                message: "Markers spent".to_string(),
            }),
        ),
        Err(err) => {
            let status = match err {
                LedgerError::InvalidAction(_) => StatusCode::BAD_REQUEST,
                LedgerError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
                LedgerError::WalletNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            // On a shortfall, echo the current balance and price so the
            // client can refresh its cache and route to the store screen
            let (cost, new_balance) = match err {
                LedgerError::InsufficientFunds { balance, cost } => (Some(cost), Some(balance)),
                _ => (None, None),
            };
            tracing::debug!("spend rejected for {}: {}", user.user_id, err);
            (
                status,
                Json(SpendResponse {
                    success: false,
                    cost,
                    new_balance,
                    error: Some(err.code().to_string()),
                    message: err.to_string(),
                }),
            )
        }
    }
}

// Product catalog endpoint (display data for the store screen)
pub async fn get_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    Json(state.catalog.all().to_vec())
}

// Action price list endpoint (display data; not authoritative for debits)
pub async fn get_prices(State(state): State<AppState>) -> Json<Vec<PriceEntry>> {
    Json(state.prices.entries())
}
