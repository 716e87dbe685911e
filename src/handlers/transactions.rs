use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Rail, Reference, TransactionStatus, TransactionType};
use crate::error::AppError;
use crate::ports::TransactionFilter;
use crate::services::CreateTransactionInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub amount: BigDecimal,
    pub fee: Option<BigDecimal>,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub rail: Rail,
    pub payment_method: Option<String>,
    pub reference: Option<Reference>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state
        .ledger
        .create_transaction(CreateTransactionInput {
            from_user: req.from_user,
            to_user: req.to_user,
            amount: req.amount,
            fee: req.fee,
            currency: req.currency,
            kind: req.kind,
            rail: req.rail,
            payment_method: req.payment_method,
            reference: req.reference,
            description: req.description,
            metadata: req.metadata,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTransactionResponse {
            transaction_id: output.transaction.id,
            status: output.transaction.status,
            client_secret: output.client_secret,
        }),
    ))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.ledger.get_transaction(id).await?;
    Ok(Json(tx))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = TransactionFilter {
        kind: query.kind,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    };

    let transactions = state.ledger.list_for_user(user_id, &filter).await?;
    Ok(Json(json!({
        "count": transactions.len(),
        "data": transactions,
    })))
}

pub async fn transaction_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.ledger.stats().await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub currency: Option<String>,
}

pub async fn user_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let currency = query.currency.unwrap_or_else(|| "USD".to_string());
    let balance = state.ledger.balance(user_id, &currency).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "currency": currency,
        "balance": balance,
    })))
}
