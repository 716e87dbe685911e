use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::handlers::auth::VerifiedWebhook;
use crate::services::{GatewayEvent, ReconciliationOutcome};
use crate::AppState;

pub const EVENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_FAILED: &str = "payment.failed";

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayEventPayload {
    pub event_type: String,
    pub external_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reason: Option<String>,
}

/// Gateway event intake. The signature extractor has already authenticated
/// the payload; anything that parses is acknowledged once the listener has
/// durably absorbed it, duplicates included.
pub async fn gateway_callback(
    State(state): State<AppState>,
    verified: VerifiedWebhook,
) -> Result<impl IntoResponse, AppError> {
    let payload: GatewayEventPayload = serde_json::from_slice(&verified.body)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {}", e)))?;

    let event = match payload.event_type.as_str() {
        EVENT_SUCCEEDED => GatewayEvent::Succeeded {
            external_id: payload.external_id,
            amount: payload.amount,
            currency: payload.currency,
        },
        EVENT_FAILED => GatewayEvent::Failed {
            external_id: payload.external_id,
            reason: payload
                .reason
                .unwrap_or_else(|| "declined by provider".to_string()),
        },
        other => {
            return Err(AppError::Validation(format!(
                "unknown event type: {}",
                other
            )))
        }
    };

    match state.reconciliation.process(event).await? {
        ReconciliationOutcome::Applied(tx) => Ok((
            StatusCode::OK,
            Json(json!({
                "received": true,
                "transaction_id": tx.id,
                "status": tx.status,
            })),
        )),
        ReconciliationOutcome::Ignored => Ok((
            StatusCode::OK,
            Json(json!({ "received": true, "ignored": true })),
        )),
    }
}
