//! In-memory implementations of the storage ports. Same compare-and-set and
//! atomicity semantics as the Postgres adapters; used by the test suite and
//! for wiring the service without a database.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::{Rail, Transaction, TransactionStatus, TransactionType};
use crate::ports::{
    LedgerStore, StatsBucket, StoreError, StoreResult, TransactionFilter, WalletError, WalletStore,
    FEE_ACCOUNT,
};

const DEFAULT_PAGE_SIZE: i64 = 25;

#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    rows: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&tx.id) {
            return Err(StoreError::AlreadyExists(tx.id.to_string()));
        }
        if let Some(external_id) = &tx.external_id {
            if rows.values().any(|row| row.external_id.as_ref() == Some(external_id)) {
                return Err(StoreError::AlreadyExists(external_id.clone()));
            }
        }
        rows.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|row| row.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn set_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|row| row.id != id && row.external_id.as_deref() == Some(external_id))
        {
            return Err(StoreError::AlreadyExists(external_id.to_string()));
        }
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.external_id = Some(external_id.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, processed_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == TransactionStatus::Pending => {
                row.status = TransactionStatus::Completed;
                row.processed_at = Some(processed_at);
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == TransactionStatus::Pending => {
                row.status = TransactionStatus::Failed;
                row.failure_reason = Some(reason.to_string());
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_refund_requested(&self, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == TransactionStatus::Completed => {
                row.status = TransactionStatus::RefundRequested;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revert_refund_request(&self, id: Uuid) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == TransactionStatus::RefundRequested => {
                row.status = TransactionStatus::Completed;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_refunded(&self, id: Uuid, refunded_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(row) if row.status == TransactionStatus::RefundRequested => {
                row.status = TransactionStatus::Refunded;
                row.refunded_at = Some(refunded_at);
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(
        &self,
        user: Uuid,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|row| row.from_user == user || row.to_user == user)
            .filter(|row| filter.kind.map_or(true, |kind| row.kind == kind))
            .filter(|row| filter.status.map_or(true, |status| row.status == status))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0) as usize;
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn stats(&self) -> StoreResult<Vec<StatsBucket>> {
        let rows = self.rows.read().await;
        let mut buckets: HashMap<(TransactionType, Rail), (i64, BigDecimal)> = HashMap::new();

        for row in rows.values() {
            if row.status != TransactionStatus::Completed || row.kind == TransactionType::Refund {
                continue;
            }
            let entry = buckets
                .entry((row.kind, row.rail))
                .or_insert_with(|| (0, BigDecimal::from(0)));
            entry.0 += 1;
            entry.1 = &entry.1 + &row.amount;
        }

        let mut result: Vec<StatsBucket> = buckets
            .into_iter()
            .map(|((kind, rail), (count, total_amount))| StatsBucket {
                kind,
                rail,
                avg_amount: total_amount.clone() / BigDecimal::from(count),
                count,
                total_amount,
            })
            .collect();

        result.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
        Ok(result)
    }

    async fn sweep_stale_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut rows = self.rows.write().await;
        let mut swept = 0;

        for row in rows.values_mut() {
            if row.rail == Rail::Gateway
                && row.status == TransactionStatus::Pending
                && row.created_at < cutoff
            {
                row.status = TransactionStatus::Failed;
                row.failure_reason = Some("abandoned".to_string());
                row.updated_at = Utc::now();
                swept += 1;
            }
        }

        Ok(swept)
    }
}

/// Balance map behind a single mutex: the insufficient-funds check and the
/// mutation happen in one critical section, like the conditional UPDATE in
/// the Postgres adapter.
#[derive(Default, Clone)]
pub struct InMemoryWalletStore {
    accounts: Arc<Mutex<HashMap<(Uuid, String), BigDecimal>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: overwrite one balance directly.
    pub async fn set_balance(&self, user: Uuid, currency: &str, balance: BigDecimal) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert((user, currency.to_string()), balance);
    }
}

fn credit(accounts: &mut HashMap<(Uuid, String), BigDecimal>, key: (Uuid, String), by: &BigDecimal) {
    let balance = accounts.entry(key).or_insert_with(|| BigDecimal::from(0));
    *balance = &*balance + by;
}

fn debit(
    accounts: &mut HashMap<(Uuid, String), BigDecimal>,
    key: (Uuid, String),
    by: &BigDecimal,
) -> Result<(), WalletError> {
    let balance = accounts.entry(key).or_insert_with(|| BigDecimal::from(0));
    if &*balance < by {
        return Err(WalletError::InsufficientFunds);
    }
    *balance = &*balance - by;
    Ok(())
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        fee: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError> {
        let net = amount - fee;
        let mut accounts = self.accounts.lock().await;
        debit(&mut accounts, (from, currency.to_string()), amount)?;
        credit(&mut accounts, (to, currency.to_string()), &net);
        credit(&mut accounts, (FEE_ACCOUNT, currency.to_string()), fee);
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
        let mut accounts = self.accounts.lock().await;
        credit(&mut accounts, (to, currency.to_string()), &net);
        credit(&mut accounts, (FEE_ACCOUNT, currency.to_string()), fee);
        Ok(())
    }

    async fn withdraw(
        &self,
        from: Uuid,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), WalletError> {
        let mut accounts = self.accounts.lock().await;
        debit(&mut accounts, (from, currency.to_string()), amount)
    }

    async fn balance(&self, user: Uuid, currency: &str) -> Result<BigDecimal, WalletError> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .get(&(user, currency.to_string()))
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rail, TransactionType};

    fn wallet_tx(from: Uuid, to: Uuid, amount: i64) -> Transaction {
        Transaction::new(
            from,
            to,
            BigDecimal::from(amount),
            BigDecimal::from(0),
            "USD".to_string(),
            TransactionType::Tip,
            Rail::Wallet,
            None,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryLedgerStore::new();
        let tx = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);

        store.insert(&tx).await.unwrap();
        assert!(matches!(
            store.insert(&tx).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn external_id_is_unique() {
        let store = InMemoryLedgerStore::new();
        let a = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        let b = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        store.set_external_id(a.id, "pi_1").await.unwrap();
        assert!(matches!(
            store.set_external_id(b.id, "pi_1").await,
            Err(StoreError::AlreadyExists(_))
        ));

        let found = store.find_by_external_id("pi_1").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);
    }

    #[tokio::test]
    async fn completion_cas_wins_once() {
        let store = InMemoryLedgerStore::new();
        let tx = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        store.insert(&tx).await.unwrap();

        assert!(store.mark_completed(tx.id, Utc::now()).await.unwrap());
        assert!(!store.mark_completed(tx.id, Utc::now()).await.unwrap());
        assert!(!store.mark_failed(tx.id, "late event").await.unwrap());

        let row = store.get(tx.id).await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Completed);
        assert!(row.processed_at.is_some());
        assert!(row.failure_reason.is_none());
    }

    #[tokio::test]
    async fn transfer_is_atomic_on_insufficient_funds() {
        let wallet = InMemoryWalletStore::new();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        wallet.set_balance(from, "USD", BigDecimal::from(100)).await;

        let err = wallet
            .transfer(from, to, &BigDecimal::from(150), &BigDecimal::from(0), "USD")
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::InsufficientFunds));
        assert_eq!(wallet.balance(from, "USD").await.unwrap(), BigDecimal::from(100));
        assert_eq!(wallet.balance(to, "USD").await.unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn concurrent_transfers_cannot_overdraw() {
        let wallet = InMemoryWalletStore::new();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        wallet.set_balance(from, "USD", BigDecimal::from(100)).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let wallet = wallet.clone();
            handles.push(tokio::spawn(async move {
                wallet
                    .transfer(from, to, &BigDecimal::from(60), &BigDecimal::from(0), "USD")
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // 100 only covers one 60; the rest must hit the balance guard.
        assert_eq!(successes, 1);
        assert_eq!(wallet.balance(from, "USD").await.unwrap(), BigDecimal::from(40));
        assert_eq!(wallet.balance(to, "USD").await.unwrap(), BigDecimal::from(60));
    }

    #[tokio::test]
    async fn transfer_routes_fee_to_platform_account() {
        let wallet = InMemoryWalletStore::new();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        wallet.set_balance(from, "USD", BigDecimal::from(100)).await;

        wallet
            .transfer(from, to, &BigDecimal::from(50), &BigDecimal::from(5), "USD")
            .await
            .unwrap();

        assert_eq!(wallet.balance(from, "USD").await.unwrap(), BigDecimal::from(50));
        assert_eq!(wallet.balance(to, "USD").await.unwrap(), BigDecimal::from(45));
        assert_eq!(
            wallet.balance(FEE_ACCOUNT, "USD").await.unwrap(),
            BigDecimal::from(5)
        );
    }

    #[tokio::test]
    async fn balances_are_per_currency() {
        let wallet = InMemoryWalletStore::new();
        let user = Uuid::new_v4();
        wallet
            .deposit(user, &BigDecimal::from(30), &BigDecimal::from(0), "USD")
            .await
            .unwrap();

        assert_eq!(wallet.balance(user, "USD").await.unwrap(), BigDecimal::from(30));
        assert_eq!(wallet.balance(user, "EUR").await.unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn sweep_only_touches_stale_gateway_rows() {
        let store = InMemoryLedgerStore::new();

        let mut stale = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        stale.rail = Rail::Gateway;
        stale.created_at = Utc::now() - chrono::Duration::hours(2);
        store.insert(&stale).await.unwrap();

        let mut fresh = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        fresh.rail = Rail::Gateway;
        store.insert(&fresh).await.unwrap();

        let wallet_row = wallet_tx(Uuid::new_v4(), Uuid::new_v4(), 10);
        store.insert(&wallet_row).await.unwrap();

        let swept = store
            .sweep_stale_pending(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(swept, 1);
        let row = store.get(stale.id).await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Failed);
        assert_eq!(row.failure_reason.as_deref(), Some("abandoned"));
        assert_eq!(
            store.get(fresh.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }
}
