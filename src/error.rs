use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ports::{ReferenceError, StoreError, WalletError};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// Something already holds this identity (a taken external id, a reused
    /// row id). Webhook-side duplicates never reach this: the listener
    /// absorbs them as no-ops and acknowledges.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("refund window expired")]
    RefundWindowExpired,

    #[error("transaction already refunded")]
    AlreadyRefunded,

    #[error("refund already in progress")]
    RefundConflict,

    /// A success event disagreed with the stored amount/currency. Never
    /// auto-resolved; an operator has to look.
    #[error("reconciliation mismatch for {external_id}: expected {expected}, event carried {actual}")]
    ReconciliationMismatch {
        external_id: String,
        expected: String,
        actual: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Stable machine-readable code, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InsufficientFunds => "insufficient_funds",
            AppError::ReferenceNotFound(_) => "reference_not_found",
            AppError::DuplicateEvent(_) => "duplicate_event",
            AppError::Gateway(_) => "gateway_error",
            AppError::RefundWindowExpired => "refund_window_expired",
            AppError::AlreadyRefunded => "already_refunded",
            AppError::RefundConflict => "refund_conflict",
            AppError::ReconciliationMismatch { .. } => "reconciliation_mismatch",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Storage(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            AppError::ReferenceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateEvent(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::RefundWindowExpired => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyRefunded => StatusCode::CONFLICT,
            AppError::RefundConflict => StatusCode::CONFLICT,
            AppError::ReconciliationMismatch { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::AlreadyExists(what) => AppError::DuplicateEvent(what),
            StoreError::Backend(detail) => AppError::Storage(detail),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds => AppError::InsufficientFunds,
            WalletError::Backend(detail) => AppError::Storage(detail),
        }
    }
}

impl From<ReferenceError> for AppError {
    fn from(err: ReferenceError) -> Self {
        match err {
            ReferenceError::NotFound(what) => AppError::ReferenceNotFound(what),
            ReferenceError::Unavailable(detail) => AppError::Storage(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_bad_request() {
        let error = AppError::Validation("amount: must be greater than zero".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "validation_error");
    }

    #[test]
    fn insufficient_funds_is_payment_required() {
        let error = AppError::InsufficientFunds;
        assert_eq!(error.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(error.code(), "insufficient_funds");
    }

    #[test]
    fn refund_conflicts_are_conflict() {
        assert_eq!(AppError::AlreadyRefunded.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::RefundConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RefundWindowExpired.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn mismatch_is_conflict_with_detail() {
        let error = AppError::ReconciliationMismatch {
            external_id: "pi_1".to_string(),
            expected: "100 USD".to_string(),
            actual: "90 USD".to_string(),
        };
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert!(error.to_string().contains("pi_1"));
    }

    #[test]
    fn wallet_and_store_errors_convert() {
        assert!(matches!(
            AppError::from(WalletError::InsufficientFunds),
            AppError::InsufficientFunds
        ));
        assert!(matches!(
            AppError::from(StoreError::NotFound("tx".into())),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn validation_error_response_shape() {
        let error = AppError::Validation("currency: must be exactly 3 characters".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
