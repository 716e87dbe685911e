//! Postgres implementation of the ledger store. Status transitions are
//! single conditional UPDATE statements so the guard and the write are one
//! atomic step.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Rail, Reference, ReferenceModel, Transaction, TransactionStatus, TransactionType};
use crate::ports::{LedgerStore, StatsBucket, StoreError, StoreResult, TransactionFilter};

const DEFAULT_PAGE_SIZE: i64 = 25;

const COLUMNS: &str = "id, external_id, from_user, to_user, amount, fee, currency, kind, status, \
     rail, reference_model, reference_id, description, metadata, failure_reason, created_at, \
     updated_at, processed_at, refunded_at";

#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, external_id, from_user, to_user, amount, fee, currency, kind, status,
                rail, reference_model, reference_id, description, metadata, failure_reason,
                created_at, updated_at, processed_at, refunded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(&tx.external_id)
        .bind(tx.from_user)
        .bind(tx.to_user)
        .bind(&tx.amount)
        .bind(&tx.fee)
        .bind(&tx.currency)
        .bind(tx.kind.as_str())
        .bind(tx.status.as_str())
        .bind(tx.rail.as_str())
        .bind(tx.reference.map(|r| r.model.as_str()))
        .bind(tx.reference.map(|r| r.id))
        .bind(&tx.description)
        .bind(&tx.metadata)
        .bind(&tx.failure_reason)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.processed_at)
        .bind(tx.refunded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.into_domain()
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<()> {
        // Explicit pre-check so callers get a typed duplicate instead of a
        // backend-specific constraint error. The unique index still backs
        // this up under races.
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM transactions WHERE external_id = $1 AND id <> $2")
                .bind(external_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;

        if taken.is_some() {
            return Err(StoreError::AlreadyExists(external_id.to_string()));
        }

        let result =
            sqlx::query("UPDATE transactions SET external_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(external_id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, processed_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'completed', processed_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'failed', failure_reason = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_refund_requested(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'refund_requested', updated_at = NOW() \
             WHERE id = $1 AND status = 'completed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn revert_refund_request(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'completed', updated_at = NOW() \
             WHERE id = $1 AND status = 'refund_requested'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'refunded', refunded_at = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'refund_requested'",
        )
        .bind(id)
        .bind(refunded_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(
        &self,
        user: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM transactions
            WHERE (from_user = $1 OR to_user = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(user)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn stats(&self) -> StoreResult<Vec<StatsBucket>> {
        let rows = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT kind, rail, COUNT(*) AS count, SUM(amount) AS total_amount,
                   AVG(amount) AS avg_amount
            FROM transactions
            WHERE status = 'completed' AND kind <> 'refund'
            GROUP BY kind, rail
            ORDER BY SUM(amount) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(StatsRow::into_bucket).collect()
    }

    async fn sweep_stale_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'failed', failure_reason = 'abandoned', \
             updated_at = NOW() \
             WHERE rail = 'gateway' AND status = 'pending' AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    external_id: Option<String>,
    from_user: Uuid,
    to_user: Uuid,
    amount: BigDecimal,
    fee: BigDecimal,
    currency: String,
    kind: String,
    status: String,
    rail: String,
    reference_model: Option<String>,
    reference_id: Option<Uuid>,
    description: Option<String>,
    metadata: Option<serde_json::Value>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let reference = match (self.reference_model, self.reference_id) {
            (Some(model), Some(id)) => Some(Reference {
                model: ReferenceModel::from_str(&model).map_err(StoreError::Backend)?,
                id,
            }),
            _ => None,
        };

        Ok(Transaction {
            id: self.id,
            external_id: self.external_id,
            from_user: self.from_user,
            to_user: self.to_user,
            amount: self.amount,
            fee: self.fee,
            currency: self.currency,
            kind: TransactionType::from_str(&self.kind).map_err(StoreError::Backend)?,
            status: TransactionStatus::from_str(&self.status).map_err(StoreError::Backend)?,
            rail: Rail::from_str(&self.rail).map_err(StoreError::Backend)?,
            reference,
            description: self.description,
            metadata: self.metadata,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processed_at: self.processed_at,
            refunded_at: self.refunded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    kind: String,
    rail: String,
    count: i64,
    total_amount: BigDecimal,
    avg_amount: BigDecimal,
}

impl StatsRow {
    fn into_bucket(self) -> StoreResult<StatsBucket> {
        Ok(StatsBucket {
            kind: TransactionType::from_str(&self.kind).map_err(StoreError::Backend)?,
            rail: Rail::from_str(&self.rail).map_err(StoreError::Backend)?,
            count: self.count,
            total_amount: self.total_amount,
            avg_amount: self.avg_amount,
        })
    }
}
