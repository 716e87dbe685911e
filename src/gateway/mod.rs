//! Card-payment gateway rail. The provider is an unreliable, at-least-once
//! collaborator; everything here is about classifying its failures and
//! keeping them away from wallet state.

pub mod client;

pub use client::CardGatewayClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure (timeout, connect). Worth retrying.
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider 5xx. Worth retrying.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// Terminal business outcome: the card was declined or the payment
    /// method is unusable. Never retried.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The provider rejected the request itself (unknown intent, malformed
    /// payload). Terminal.
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// Fast-fail while the circuit breaker is open.
    #[error("gateway circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_errors() {
        assert!(GatewayError::Unavailable("502".into()).is_retryable());
        assert!(!GatewayError::Declined("card_declined".into()).is_retryable());
        assert!(!GatewayError::Rejected("no such intent".into()).is_retryable());
        assert!(!GatewayError::CircuitOpen("open".into()).is_retryable());
    }
}
