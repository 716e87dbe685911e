//! Implementations of the collaborator ports: the reference-owning services
//! (content/sessions) and the notification dispatcher. Both sit outside the
//! invariant core; their failures are logged, never propagated into ledger
//! state.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::domain::{Reference, Transaction};
use crate::ports::{NotificationDispatcher, ReferenceError, ReferenceResolver};

/// Talks to the service that owns referenced business objects. Asks whether
/// the object is payable before a transaction is created and reports
/// completion afterwards so the owner can unlock content or admit a session
/// participant. The fulfill call is idempotent on the collaborator side.
#[derive(Clone)]
pub struct HttpReferenceResolver {
    client: Client,
    base_url: String,
}

impl HttpReferenceResolver {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, base_url }
    }

    fn endpoint(&self, reference: &Reference, suffix: &str) -> String {
        format!(
            "{}/internal/references/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            reference.model.as_str(),
            reference.id,
            suffix
        )
    }
}

#[async_trait]
impl ReferenceResolver for HttpReferenceResolver {
    async fn verify_payable(&self, reference: &Reference) -> Result<(), ReferenceError> {
        let url = self.endpoint(reference, "payable");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReferenceError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::CONFLICT => Err(
                ReferenceError::NotFound(format!("{}/{}", reference.model.as_str(), reference.id)),
            ),
            status => Err(ReferenceError::Unavailable(format!(
                "reference service returned {}",
                status
            ))),
        }
    }

    async fn apply_completion(
        &self,
        reference: &Reference,
        tx: &Transaction,
    ) -> Result<(), ReferenceError> {
        let url = self.endpoint(reference, "fulfill");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "transaction_id": tx.id,
                "buyer": tx.from_user,
                "amount": tx.amount,
                "currency": tx.currency,
            }))
            .send()
            .await
            .map_err(|e| ReferenceError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ReferenceError::NotFound(format!(
                "{}/{}",
                reference.model.as_str(),
                reference.id
            ))),
            status => Err(ReferenceError::Unavailable(format!(
                "reference service returned {}",
                status
            ))),
        }
    }
}

/// Accepts every reference and ignores completions. Used when no reference
/// service is configured (standalone deployments, local runs).
#[derive(Default, Clone)]
pub struct PermissiveResolver;

#[async_trait]
impl ReferenceResolver for PermissiveResolver {
    async fn verify_payable(&self, _reference: &Reference) -> Result<(), ReferenceError> {
        Ok(())
    }

    async fn apply_completion(
        &self,
        reference: &Reference,
        tx: &Transaction,
    ) -> Result<(), ReferenceError> {
        tracing::debug!(
            transaction_id = %tx.id,
            reference = %format!("{}/{}", reference.model.as_str(), reference.id),
            "no reference service configured, completion side effect skipped"
        );
        Ok(())
    }
}

/// Notification delivery is fire-and-forget: terminal state changes are
/// announced, and nothing that happens here can touch the ledger.
#[derive(Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn transaction_completed(&self, tx: &Transaction) {
        tracing::info!(
            transaction_id = %tx.id,
            from_user = %tx.from_user,
            to_user = %tx.to_user,
            amount = %tx.amount,
            currency = %tx.currency,
            kind = %tx.kind,
            rail = %tx.rail,
            "transaction completed"
        );
    }

    async fn transaction_failed(&self, tx: &Transaction, reason: &str) {
        tracing::info!(
            transaction_id = %tx.id,
            from_user = %tx.from_user,
            reason,
            "transaction failed"
        );
    }

    async fn refund_processed(&self, original: &Transaction, refund: &Transaction) {
        tracing::info!(
            original_id = %original.id,
            refund_id = %refund.id,
            amount = %refund.amount,
            currency = %refund.currency,
            "refund processed"
        );
    }
}
