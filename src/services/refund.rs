//! Refund engine: drives a compensating transaction back through the rail
//! that funded the original. The `completed -> refund_requested` CAS happens
//! before any money moves, so a second concurrent attempt is rejected
//! cheaply; provider failures roll the original back to `completed`.

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Rail, Reference, ReferenceModel, Transaction, TransactionStatus, TransactionType};
use crate::error::AppError;
use crate::ports::{
    GatewayRail, LedgerStore, NotificationDispatcher, WalletStore, FEE_ACCOUNT,
};
use crate::validation::{sanitize_string, validate_max_len, REASON_MAX_LEN};

#[derive(Debug, Clone)]
pub struct RefundInput {
    pub transaction_id: Uuid,
    pub reason: String,
    /// Whether the platform fee is returned too. Policy decision left to the
    /// caller; default is to keep it.
    pub return_fee: bool,
}

pub struct RefundService {
    store: Arc<dyn LedgerStore>,
    wallet: Arc<dyn WalletStore>,
    gateway: Arc<dyn GatewayRail>,
    notifier: Arc<dyn NotificationDispatcher>,
    window: Duration,
}

impl RefundService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallet: Arc<dyn WalletStore>,
        gateway: Arc<dyn GatewayRail>,
        notifier: Arc<dyn NotificationDispatcher>,
        window_days: i64,
    ) -> Self {
        Self {
            store,
            wallet,
            gateway,
            notifier,
            window: Duration::days(window_days),
        }
    }

    pub async fn refund(&self, input: RefundInput) -> Result<Transaction, AppError> {
        let reason = sanitize_string(&input.reason);
        validate_max_len("reason", &reason, REASON_MAX_LEN)?;

        let original = self
            .store
            .get(input.transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", input.transaction_id)))?;

        match original.status {
            TransactionStatus::Completed => {}
            TransactionStatus::Refunded => return Err(AppError::AlreadyRefunded),
            TransactionStatus::RefundRequested => return Err(AppError::RefundConflict),
            _ => {
                return Err(AppError::Validation(
                    "only completed transactions can be refunded".to_string(),
                ))
            }
        }

        let processed_at = original.processed_at.ok_or_else(|| {
            AppError::Storage(format!(
                "completed transaction {} has no processed_at",
                original.id
            ))
        })?;

        if Utc::now() - processed_at > self.window {
            return Err(AppError::RefundWindowExpired);
        }

        // Win the refund_requested transition before touching balances; the
        // loser of a concurrent double-submit stops here.
        if !self.store.mark_refund_requested(original.id).await? {
            return Err(AppError::RefundConflict);
        }

        let refund_amount = if input.return_fee {
            original.amount.clone()
        } else {
            original.net_amount()
        };

        let moved = match original.rail {
            Rail::Wallet => self.reverse_on_wallet(&original, input.return_fee).await,
            Rail::Gateway => {
                self.reverse_on_gateway(&original, &refund_amount, input.return_fee)
                    .await
            }
            Rail::ExternalWallet => Err(AppError::Validation(
                "rail external_wallet is not supported yet".to_string(),
            )),
        };

        if let Err(err) = moved {
            // The reversal did not happen; put the original back so a later
            // attempt can retry.
            if !self.store.revert_refund_request(original.id).await? {
                tracing::error!(
                    transaction_id = %original.id,
                    "could not roll back refund_requested after failed reversal"
                );
            }
            return Err(err);
        }

        let mut refund_tx = Transaction::new(
            original.to_user,
            original.from_user,
            refund_amount,
            BigDecimal::from(0),
            original.currency.clone(),
            TransactionType::Refund,
            original.rail,
            Some(Reference {
                model: ReferenceModel::Transaction,
                id: original.id,
            }),
            Some(format!("refund of transaction {}", original.id)),
            Some(serde_json::json!({
                "reason": reason,
                "return_fee": input.return_fee,
            })),
        );
        refund_tx.status = TransactionStatus::Completed;
        refund_tx.processed_at = Some(Utc::now());

        let refund_tx = self.store.insert(&refund_tx).await?;
        self.store.mark_refunded(original.id, Utc::now()).await?;

        self.notifier.refund_processed(&original, &refund_tx).await;
        tracing::info!(
            original_id = %original.id,
            refund_id = %refund_tx.id,
            amount = %refund_tx.amount,
            return_fee = input.return_fee,
            "refund settled"
        );

        Ok(refund_tx)
    }

    /// Wallet rail: the payee hands back the net they received; with
    /// `return_fee` the platform account hands back the fee as a second leg.
    async fn reverse_on_wallet(
        &self,
        original: &Transaction,
        return_fee: bool,
    ) -> Result<(), AppError> {
        let net = original.net_amount();
        let zero = BigDecimal::from(0);

        self.wallet
            .transfer(
                original.to_user,
                original.from_user,
                &net,
                &zero,
                &original.currency,
            )
            .await?;

        if return_fee && original.fee > zero {
            if let Err(err) = self
                .wallet
                .transfer(
                    FEE_ACCOUNT,
                    original.from_user,
                    &original.fee,
                    &zero,
                    &original.currency,
                )
                .await
            {
                // Undo the first leg so the failed refund moved nothing.
                if let Err(undo) = self
                    .wallet
                    .transfer(
                        original.from_user,
                        original.to_user,
                        &net,
                        &zero,
                        &original.currency,
                    )
                    .await
                {
                    tracing::error!(
                        transaction_id = %original.id,
                        error = %undo,
                        "failed to undo net leg after fee leg failure"
                    );
                }
                return Err(err.into());
            }
        }

        Ok(())
    }

    /// Gateway rail: pull the payee's stored credit back first (cheap local
    /// failure), then ask the provider to reverse. A provider failure
    /// re-credits and the caller rolls the status back.
    async fn reverse_on_gateway(
        &self,
        original: &Transaction,
        refund_amount: &BigDecimal,
        return_fee: bool,
    ) -> Result<(), AppError> {
        let external_id = original.external_id.clone().ok_or_else(|| {
            AppError::Storage(format!(
                "gateway transaction {} has no external id",
                original.id
            ))
        })?;

        let net = original.net_amount();
        let zero = BigDecimal::from(0);

        self.wallet
            .withdraw(original.to_user, &net, &original.currency)
            .await?;

        if return_fee && original.fee > zero {
            if let Err(err) = self
                .wallet
                .withdraw(FEE_ACCOUNT, &original.fee, &original.currency)
                .await
            {
                self.redeposit(original.to_user, &net, &original.currency).await;
                return Err(err.into());
            }
        }

        if let Err(err) = self
            .gateway
            .reverse(&external_id, refund_amount, &original.currency)
            .await
        {
            tracing::warn!(
                transaction_id = %original.id,
                external_id = %external_id,
                error = %err,
                "provider reversal failed, restoring wallet credit"
            );
            self.redeposit(original.to_user, &net, &original.currency).await;
            if return_fee && original.fee > zero {
                self.redeposit(FEE_ACCOUNT, &original.fee, &original.currency)
                    .await;
            }
            return Err(AppError::Gateway(err));
        }

        Ok(())
    }

    async fn redeposit(&self, user: Uuid, amount: &BigDecimal, currency: &str) {
        let zero = BigDecimal::from(0);
        if let Err(err) = self.wallet.deposit(user, amount, &zero, currency).await {
            tracing::error!(
                user = %user,
                amount = %amount,
                currency,
                error = %err,
                "failed to restore wallet credit after aborted reversal"
            );
        }
    }
}
