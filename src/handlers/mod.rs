pub mod auth;
pub mod refunds;
pub mod transactions;
pub mod webhook;

use axum::{response::IntoResponse, Json};
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
