pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use crate::config::Config;
use crate::services::{LedgerService, ReconciliationService, RefundService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<LedgerService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub refunds: Arc<RefundService>,
}

pub async fn db_pool(config: &Config) -> Result<sqlx::PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions", post(handlers::transactions::create_transaction))
        .route("/transactions/stats", get(handlers::transactions::transaction_stats))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route(
            "/transactions/:id/refund",
            post(handlers::refunds::refund_transaction),
        )
        .route(
            "/users/:user_id/transactions",
            get(handlers::transactions::list_user_transactions),
        )
        .route("/users/:user_id/balance", get(handlers::transactions::user_balance))
        .route("/webhooks/gateway", post(handlers::webhook::gateway_callback))
        .with_state(state)
}
