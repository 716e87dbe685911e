//! The seams between the ledger core and its collaborators. Every external
//! dependency (storage, wallet balances, the card gateway, the services that
//! own referenced business objects, notifications) is injected through one of
//! these traits; nothing reaches a process-wide singleton.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Rail, Reference, Transaction, TransactionStatus, TransactionType};
use crate::gateway::GatewayError;

/// Reserved account that receives the fee leg of every transfer and deposit.
/// Keeping fees inside the wallet system means sum(debits) == sum(credits)
/// holds exactly, fees included.
pub const FEE_ACCOUNT: Uuid = Uuid::nil();

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("wallet backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One row of the aggregate projection: completed, non-refund transactions
/// grouped by type and rail.
#[derive(Debug, Clone, Serialize)]
pub struct StatsBucket {
    pub kind: TransactionType,
    pub rail: Rail,
    pub count: i64,
    pub total_amount: BigDecimal,
    pub avg_amount: BigDecimal,
}

/// Append-only transaction log. Status changes are compare-and-set: the
/// `mark_*` methods mutate only when the row is still in the expected prior
/// status and report whether this call won the transition. Losing the race is
/// how duplicate and out-of-order events are absorbed.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Lookup by the provider-side identifier (the reconciliation
    /// idempotency key).
    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>>;

    /// Attach the provider id to a pending row after intent creation.
    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<()>;

    /// `pending -> completed`; stamps `processed_at`.
    async fn mark_completed(&self, id: Uuid, processed_at: DateTime<Utc>) -> StoreResult<bool>;

    /// `pending -> failed`; records the reason.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<bool>;

    /// `completed -> refund_requested`. The winner of this transition is the
    /// only caller allowed to move money for the refund.
    async fn mark_refund_requested(&self, id: Uuid) -> StoreResult<bool>;

    /// `refund_requested -> completed`: the reversal did not happen.
    async fn revert_refund_request(&self, id: Uuid) -> StoreResult<bool>;

    /// `refund_requested -> refunded`; stamps `refunded_at`.
    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<bool>;

    /// History for one user (either side of the movement), newest first.
    async fn list_for_user(
        &self,
        user: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>>;

    async fn stats(&self) -> StoreResult<Vec<StatsBucket>>;

    /// Gateway-rail rows still pending after `cutoff` never got their event;
    /// mark them failed. Returns how many rows were swept.
    async fn sweep_stale_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Per-user, per-currency stored-value balances. These three primitives are
/// the only place balances change; each one checks and mutates in a single
/// atomic step so no caller can observe or exploit an intermediate state.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Internal movement: debit `amount` from `from`, credit `amount - fee`
    /// to `to`, credit `fee` to [`FEE_ACCOUNT`]. All or nothing.
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        fee: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError>;

    /// External money entering the system (a reconciled gateway payment):
    /// credit `amount - fee` to `to` and `fee` to [`FEE_ACCOUNT`].
    async fn deposit(
        &self,
        to: Uuid,
        amount: &BigDecimal,
        fee: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError>;

    /// External money leaving the system (a gateway reversal).
    async fn withdraw(
        &self,
        from: Uuid,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError>;

    /// Missing rows read as zero.
    async fn balance(&self, user: Uuid, currency: &str) -> Result<BigDecimal, WalletError>;
}

#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub external_id: String,
    /// Handed back to the caller so it can finish provider-side
    /// authentication; the ledger never uses it.
    pub client_secret: Option<String>,
}

/// The external card rail. Implementations own their own retry and circuit
/// breaking; callers only distinguish retryable from terminal outcomes.
#[async_trait]
pub trait GatewayRail: Send + Sync {
    async fn create_intent(&self, req: &PaymentIntentRequest)
        -> Result<PaymentIntent, GatewayError>;

    async fn reverse(
        &self,
        external_id: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference not found or not payable: {0}")]
    NotFound(String),

    #[error("reference service unavailable: {0}")]
    Unavailable(String),
}

/// Owned by the content/session services. The ledger asks before creating a
/// transaction and tells after one completes; the completion call is
/// idempotent on the collaborator side and may be retried.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn verify_payable(&self, reference: &Reference) -> Result<(), ReferenceError>;

    async fn apply_completion(
        &self,
        reference: &Reference,
        tx: &Transaction,
    ) -> Result<(), ReferenceError>;
}

/// Fire-and-forget. Implementations swallow and log their own failures;
/// a lost notification never rolls back ledger state.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn transaction_completed(&self, tx: &Transaction);

    async fn transaction_failed(&self, tx: &Transaction, reason: &str);

    async fn refund_processed(&self, original: &Transaction, refund: &Transaction);
}
