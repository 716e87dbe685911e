//! Postgres implementation of the wallet store. The debit leg is one
//! conditional UPDATE (`... AND balance >= amount`) inside the same SQL
//! transaction as the credit legs, so the balance check and the mutation are
//! a single atomic step and the non-negative invariant cannot be raced.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::ports::{WalletError, WalletStore, FEE_ACCOUNT};

#[derive(Clone)]
pub struct PostgresWalletStore {
    pool: PgPool,
}

impl PostgresWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> WalletError {
    WalletError::Backend(err.to_string())
}

async fn debit(
    txn: &mut SqlxTransaction<'_, Postgres>,
    user: Uuid,
    currency: &str,
    amount: &BigDecimal,
) -> Result<bool, WalletError> {
    let result = sqlx::query(
        "UPDATE wallet_accounts SET balance = balance - $3, updated_at = NOW() \
         WHERE user_id = $1 AND currency = $2 AND balance >= $3",
    )
    .bind(user)
    .bind(currency)
    .bind(amount)
    .execute(&mut **txn)
    .await
    .map_err(backend)?;

    Ok(result.rows_affected() > 0)
}

async fn credit(
    txn: &mut SqlxTransaction<'_, Postgres>,
    user: Uuid,
    currency: &str,
    amount: &BigDecimal,
) -> Result<(), WalletError> {
    sqlx::query(
        "INSERT INTO wallet_accounts (user_id, currency, balance, updated_at) \
         VALUES ($1, $2, $3, NOW()) \
         ON CONFLICT (user_id, currency) \
         DO UPDATE SET balance = wallet_accounts.balance + EXCLUDED.balance, updated_at = NOW()",
    )
    .bind(user)
    .bind(currency)
    .bind(amount)
    .execute(&mut **txn)
    .await
    .map_err(backend)?;

    Ok(())
}

#[async_trait]
impl WalletStore for PostgresWalletStore {
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        fee: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError> {
        let net = amount - fee;
        let mut txn = self.pool.begin().await.map_err(backend)?;

        if !debit(&mut txn, from, currency, amount).await? {
            txn.rollback().await.map_err(backend)?;
            return Err(WalletError::InsufficientFunds);
        }

        credit(&mut txn, to, currency, &net).await?;
        if fee > &BigDecimal::from(0) {
            credit(&mut txn, FEE_ACCOUNT, currency, fee).await?;
        }

        txn.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn deposit(
        &self,
        to: Uuid,
        amount: &BigDecimal,
        fee: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError> {
        let net = amount - fee;
        let mut txn = self.pool.begin().await.map_err(backend)?;

        credit(&mut txn, to, currency, &net).await?;
        if fee > &BigDecimal::from(0) {
            credit(&mut txn, FEE_ACCOUNT, currency, fee).await?;
        }

        txn.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn withdraw(
        &self,
        from: Uuid,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError> {
        let mut txn = self.pool.begin().await.map_err(backend)?;

        if !debit(&mut txn, from, currency, amount).await? {
            txn.rollback().await.map_err(backend)?;
            return Err(WalletError::InsufficientFunds);
        }

        txn.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn balance(&self, user: Uuid, currency: &str) -> Result<BigDecimal, WalletError> {
        let row: Option<(BigDecimal,)> =
            sqlx::query_as("SELECT balance FROM wallet_accounts WHERE user_id = $1 AND currency = $2")
                .bind(user)
                .bind(currency)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        Ok(row.map(|(balance,)| balance).unwrap_or_else(|| BigDecimal::from(0)))
    }
}
