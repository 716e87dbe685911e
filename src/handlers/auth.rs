use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Meridian-Signature";

/// Extractor that verifies the gateway webhook signature against the raw
/// request body using HMAC-SHA256 before any processing happens.
pub struct VerifiedWebhook {
    pub body: Vec<u8>,
}

impl VerifiedWebhook {
    /// Verify the signature using constant-time comparison.
    fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> Result<(), AuthError> {
        let expected_signature =
            hex::decode(signature_header).map_err(|_| AuthError::InvalidSignatureFormat)?;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidSecret)?;
        mac.update(body);

        mac.verify_slice(&expected_signature)
            .map_err(|_| AuthError::SignatureMismatch)?;

        Ok(())
    }
}

/// Compute the hex signature for a payload; the counterpart of
/// [`VerifiedWebhook`], used by tests and by anything that needs to call us.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl FromRequest<crate::AppState> for VerifiedWebhook {
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &crate::AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(AuthError::MissingSignature)?;

        let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .map_err(|_| AuthError::BodyReadError)?
            .to_vec();

        Self::verify_signature(&state.config.gateway_webhook_secret, &body_bytes, &signature)?;

        Ok(VerifiedWebhook { body: body_bytes })
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingSignature,
    InvalidSignatureFormat,
    InvalidSecret,
    SignatureMismatch,
    BodyReadError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSignature => (
                StatusCode::UNAUTHORIZED,
                "Missing X-Meridian-Signature header",
            ),
            AuthError::InvalidSignatureFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid signature format")
            }
            AuthError::InvalidSecret => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid webhook secret configuration",
            ),
            AuthError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed")
            }
            AuthError::BodyReadError => (StatusCode::BAD_REQUEST, "Failed to read request body"),
        };

        tracing::warn!("Webhook authentication failed: {:?}", self);
        (status, message).into_response()
    }
}
