use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::RefundInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
    /// Whether the platform fee goes back too. Defaults to keeping it.
    #[serde(default)]
    pub return_fee: bool,
}

/// Privileged: authentication and role checks live with the routing
/// collaborator in front of this service.
pub async fn refund_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let refund = state
        .refunds
        .refund(RefundInput {
            transaction_id: id,
            reason: req.reason,
            return_fee: req.return_fee,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(refund)))
}
