//! Reconciliation listener: applies asynchronous gateway outcomes to pending
//! transactions. The event channel delivers at-least-once and out of order,
//! so every transition here is a status-guarded set operation and anything
//! that lost its race is absorbed as a no-op.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;

use crate::domain::{Transaction, TransactionStatus};
use crate::error::AppError;
use crate::ports::{LedgerStore, NotificationDispatcher, ReferenceResolver, WalletStore};

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Succeeded {
        external_id: String,
        amount: BigDecimal,
        currency: String,
    },
    Failed {
        external_id: String,
        reason: String,
    },
}

#[derive(Debug)]
pub enum ReconciliationOutcome {
    /// This delivery won the transition.
    Applied(Transaction),
    /// Duplicate, late, or unknown event; nothing changed.
    Ignored,
}

pub struct ReconciliationService {
    store: Arc<dyn LedgerStore>,
    wallet: Arc<dyn WalletStore>,
    resolver: Arc<dyn ReferenceResolver>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallet: Arc<dyn WalletStore>,
        resolver: Arc<dyn ReferenceResolver>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            wallet,
            resolver,
            notifier,
        }
    }

    pub async fn process(&self, event: GatewayEvent) -> Result<ReconciliationOutcome, AppError> {
        match event {
            GatewayEvent::Succeeded {
                external_id,
                amount,
                currency,
            } => self.apply_success(&external_id, &amount, &currency).await,
            GatewayEvent::Failed {
                external_id,
                reason,
            } => self.apply_failure(&external_id, &reason).await,
        }
    }

    async fn apply_success(
        &self,
        external_id: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<ReconciliationOutcome, AppError> {
        let Some(tx) = self.store.find_by_external_id(external_id).await? else {
            tracing::info!(external_id, "success event for unknown external id, ignoring");
            return Ok(ReconciliationOutcome::Ignored);
        };

        if tx.status != TransactionStatus::Pending {
            tracing::info!(
                external_id,
                transaction_id = %tx.id,
                status = %tx.status,
                "duplicate success event for settled transaction, ignoring"
            );
            return Ok(ReconciliationOutcome::Ignored);
        }

        // The provider's numbers have to agree with ours before anything
        // moves; a mismatch goes to an operator, never auto-resolved.
        if &tx.amount != amount || tx.currency != currency {
            tracing::error!(
                external_id,
                transaction_id = %tx.id,
                expected_amount = %tx.amount,
                expected_currency = %tx.currency,
                event_amount = %amount,
                event_currency = %currency,
                "reconciliation mismatch, manual review required"
            );
            return Err(AppError::ReconciliationMismatch {
                external_id: external_id.to_string(),
                expected: format!("{} {}", tx.amount, tx.currency),
                actual: format!("{} {}", amount, currency),
            });
        }

        // Only the CAS winner credits the payee: N deliveries, one balance
        // change.
        if !self.store.mark_completed(tx.id, Utc::now()).await? {
            tracing::info!(
                external_id,
                transaction_id = %tx.id,
                "lost completion race to a concurrent delivery, ignoring"
            );
            return Ok(ReconciliationOutcome::Ignored);
        }

        self.wallet
            .deposit(tx.to_user, &tx.amount, &tx.fee, &tx.currency)
            .await?;

        let completed = self
            .store
            .get(tx.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", tx.id)))?;

        if let Some(reference) = &completed.reference {
            if let Err(err) = self.resolver.apply_completion(reference, &completed).await {
                tracing::warn!(
                    transaction_id = %completed.id,
                    error = %err,
                    "reference completion side effect failed, will rely on retry"
                );
            }
        }
        self.notifier.transaction_completed(&completed).await;

        Ok(ReconciliationOutcome::Applied(completed))
    }

    async fn apply_failure(
        &self,
        external_id: &str,
        reason: &str,
    ) -> Result<ReconciliationOutcome, AppError> {
        let Some(tx) = self.store.find_by_external_id(external_id).await? else {
            tracing::info!(external_id, "failure event for unknown external id, ignoring");
            return Ok(ReconciliationOutcome::Ignored);
        };

        if tx.status != TransactionStatus::Pending {
            tracing::info!(
                external_id,
                transaction_id = %tx.id,
                status = %tx.status,
                "duplicate failure event for settled transaction, ignoring"
            );
            return Ok(ReconciliationOutcome::Ignored);
        }

        if !self.store.mark_failed(tx.id, reason).await? {
            return Ok(ReconciliationOutcome::Ignored);
        }

        let failed = self
            .store
            .get(tx.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", tx.id)))?;
        self.notifier.transaction_failed(&failed, reason).await;

        Ok(ReconciliationOutcome::Applied(failed))
    }
}
