//! Transaction domain entity.
//! Framework-agnostic representation of one unit of value movement.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Business event that caused the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Tip,
    ContentPurchase,
    SessionFee,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Tip => "tip",
            TransactionType::ContentPurchase => "content_purchase",
            TransactionType::SessionFee => "session_fee",
            TransactionType::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tip" => Ok(TransactionType::Tip),
            "content_purchase" => Ok(TransactionType::ContentPurchase),
            "session_fee" => Ok(TransactionType::SessionFee),
            "refund" => Ok(TransactionType::Refund),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Settlement channel the transaction uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    Wallet,
    Gateway,
    /// Declared but not wired to any provider yet; creation rejects it.
    ExternalWallet,
}

impl Rail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rail::Wallet => "wallet",
            Rail::Gateway => "gateway",
            Rail::ExternalWallet => "external_wallet",
        }
    }
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rail {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "wallet" => Ok(Rail::Wallet),
            "gateway" => Ok(Rail::Gateway),
            "external_wallet" => Ok(Rail::ExternalWallet),
            other => Err(format!("unknown rail: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    RefundRequested,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::RefundRequested => "refund_requested",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// No further transitions happen from here except through the refund
    /// workflow starting at `Completed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Refunded
        )
    }

    /// The legal status state machine. Every storage transition is guarded by
    /// this; anything else is rejected as a duplicate or out-of-order event.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Completed, RefundRequested)
                | (RefundRequested, Refunded)
                | (RefundRequested, Completed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refund_requested" => Ok(TransactionStatus::RefundRequested),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Kind of business object a transaction points back at. The objects
/// themselves are owned by other services; the ledger only stores the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceModel {
    Content,
    Session,
    User,
    Transaction,
}

impl ReferenceModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceModel::Content => "content",
            ReferenceModel::Session => "session",
            ReferenceModel::User => "user",
            ReferenceModel::Transaction => "transaction",
        }
    }
}

impl FromStr for ReferenceModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "content" => Ok(ReferenceModel::Content),
            "session" => Ok(ReferenceModel::Session),
            "user" => Ok(ReferenceModel::User),
            "transaction" => Ok(ReferenceModel::Transaction),
            other => Err(format!("unknown reference model: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub model: ReferenceModel,
    pub id: Uuid,
}

/// One row of the append-only ledger. Never deleted; once the status leaves
/// `Pending`, amount/fee/currency/rail are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Provider-side identifier for gateway-rail rows; the idempotency key
    /// for reconciliation events.
    pub external_id: Option<String>,
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub rail: Rail,
    pub reference: Option<Reference>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from_user: Uuid,
        to_user: Uuid,
        amount: BigDecimal,
        fee: BigDecimal,
        currency: String,
        kind: TransactionType,
        rail: Rail,
        reference: Option<Reference>,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: None,
            from_user,
            to_user,
            amount,
            fee,
            currency,
            kind,
            status: TransactionStatus::Pending,
            rail,
            reference,
            description,
            metadata,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            refunded_at: None,
        }
    }

    /// Derived, never stored: what the payee actually receives.
    pub fn net_amount(&self) -> BigDecimal {
        &self.amount - &self.fee
    }
}
