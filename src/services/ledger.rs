//! Ledger core: validates a transaction request, records it durably, routes
//! it to the selected rail, and drives synchronous (wallet) completion. The
//! pending row is always written before any side effect, so every attempt
//! leaves an audit record.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Rail, Reference, Transaction, TransactionType};
use crate::error::AppError;
use crate::ports::{
    GatewayRail, LedgerStore, NotificationDispatcher, PaymentIntentRequest, ReferenceResolver,
    WalletError, WalletStore,
};
use crate::validation::{
    sanitize_string, validate_currency, validate_distinct_parties, validate_fee, validate_max_len,
    validate_positive_amount, DESCRIPTION_MAX_LEN,
};

#[derive(Debug, Clone)]
pub struct CreateTransactionInput {
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub amount: BigDecimal,
    /// Platform fee; defaults to zero. Must stay within `0..=amount`.
    pub fee: Option<BigDecimal>,
    pub currency: String,
    pub kind: TransactionType,
    pub rail: Rail,
    /// Provider-side payment method token, passed through to the gateway.
    pub payment_method: Option<String>,
    pub reference: Option<Reference>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CreateTransactionOutput {
    pub transaction: Transaction,
    /// Gateway rail only: the secret the caller needs to finish
    /// provider-side authentication.
    pub client_secret: Option<String>,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    wallet: Arc<dyn WalletStore>,
    gateway: Arc<dyn GatewayRail>,
    resolver: Arc<dyn ReferenceResolver>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallet: Arc<dyn WalletStore>,
        gateway: Arc<dyn GatewayRail>,
        resolver: Arc<dyn ReferenceResolver>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            wallet,
            gateway,
            resolver,
            notifier,
        }
    }

    pub async fn create_transaction(
        &self,
        input: CreateTransactionInput,
    ) -> Result<CreateTransactionOutput, AppError> {
        let currency = sanitize_string(&input.currency);
        validate_currency(&currency)?;
        validate_positive_amount(&input.amount)?;
        let fee = input.fee.clone().unwrap_or_else(|| BigDecimal::from(0));
        validate_fee(&fee, &input.amount)?;
        validate_distinct_parties(input.from_user, input.to_user)?;
        if let Some(description) = &input.description {
            validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;
        }

        if input.kind == TransactionType::Refund {
            return Err(AppError::Validation(
                "refund transactions are created by the refund workflow".to_string(),
            ));
        }

        if input.rail == Rail::ExternalWallet {
            return Err(AppError::Validation(
                "rail external_wallet is not supported yet".to_string(),
            ));
        }

        // The owning collaborator confirms the referenced object exists and
        // is payable before anything is persisted.
        if let Some(reference) = &input.reference {
            self.resolver.verify_payable(reference).await?;
        }

        // Durable pending record first; rails only run against a row that
        // already exists.
        let tx = Transaction::new(
            input.from_user,
            input.to_user,
            input.amount.clone(),
            fee,
            currency,
            input.kind,
            input.rail,
            input.reference,
            input.description.clone(),
            input.metadata.clone(),
        );
        let tx = self.store.insert(&tx).await?;

        match input.rail {
            Rail::Wallet => self.settle_on_wallet(tx).await,
            Rail::Gateway => self.open_gateway_intent(tx, &input).await,
            // Already rejected above; kept as a guard rather than a panic.
            Rail::ExternalWallet => Err(AppError::Validation(
                "rail external_wallet is not supported yet".to_string(),
            )),
        }
    }

    /// Wallet rail settles synchronously: one atomic transfer, then the
    /// terminal status.
    async fn settle_on_wallet(&self, tx: Transaction) -> Result<CreateTransactionOutput, AppError> {
        match self
            .wallet
            .transfer(tx.from_user, tx.to_user, &tx.amount, &tx.fee, &tx.currency)
            .await
        {
            Ok(()) => {
                self.store.mark_completed(tx.id, Utc::now()).await?;
                let completed = self.load(tx.id).await?;
                self.fire_completion_effects(&completed).await;
                Ok(CreateTransactionOutput {
                    transaction: completed,
                    client_secret: None,
                })
            }
            Err(WalletError::InsufficientFunds) => {
                self.store.mark_failed(tx.id, "insufficient_funds").await?;
                let failed = self.load(tx.id).await?;
                self.notifier
                    .transaction_failed(&failed, "insufficient_funds")
                    .await;
                Err(AppError::InsufficientFunds)
            }
            Err(err) => {
                self.store.mark_failed(tx.id, "wallet_unavailable").await?;
                Err(err.into())
            }
        }
    }

    /// Gateway rail returns immediately with the continuation secret; the
    /// reconciliation listener finishes the job when the provider reports.
    /// The provider call happens after the durable insert and holds no lock.
    async fn open_gateway_intent(
        &self,
        tx: Transaction,
        input: &CreateTransactionInput,
    ) -> Result<CreateTransactionOutput, AppError> {
        let request = PaymentIntentRequest {
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            description: tx.description.clone(),
            payment_method: input.payment_method.clone(),
            metadata: serde_json::json!({
                "transaction_id": tx.id,
                "from_user": tx.from_user,
                "to_user": tx.to_user,
            }),
        };

        match self.gateway.create_intent(&request).await {
            Ok(intent) => {
                self.store.set_external_id(tx.id, &intent.external_id).await?;
                let pending = self.load(tx.id).await?;
                tracing::info!(
                    transaction_id = %pending.id,
                    external_id = %intent.external_id,
                    "gateway intent created, awaiting provider event"
                );
                Ok(CreateTransactionOutput {
                    transaction: pending,
                    client_secret: intent.client_secret,
                })
            }
            Err(err) => {
                // The client already exhausted retries for retryable
                // failures; whatever reaches this point is terminal for the
                // payment.
                self.store.mark_failed(tx.id, &err.to_string()).await?;
                let failed = self.load(tx.id).await?;
                self.notifier
                    .transaction_failed(&failed, &err.to_string())
                    .await;
                Err(AppError::Gateway(err))
            }
        }
    }

    /// Post-completion effects: tell the reference owner (idempotent, may be
    /// retried) and the notification dispatcher. Neither can undo the ledger.
    async fn fire_completion_effects(&self, tx: &Transaction) {
        if let Some(reference) = &tx.reference {
            if let Err(err) = self.resolver.apply_completion(reference, tx).await {
                tracing::warn!(
                    transaction_id = %tx.id,
                    error = %err,
                    "reference completion side effect failed, will rely on retry"
                );
            }
        }
        self.notifier.transaction_completed(tx).await;
    }

    async fn load(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.load(id).await
    }

    pub async fn list_for_user(
        &self,
        user: Uuid,
        filter: &crate::ports::TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self.store.list_for_user(user, filter).await?)
    }

    pub async fn stats(&self) -> Result<Vec<crate::ports::StatsBucket>, AppError> {
        Ok(self.store.stats().await?)
    }

    pub async fn balance(&self, user: Uuid, currency: &str) -> Result<BigDecimal, AppError> {
        let currency = sanitize_string(currency);
        validate_currency(&currency)?;
        Ok(self.wallet.balance(user, &currency).await?)
    }
}
