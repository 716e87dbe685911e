#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use meridian_core::adapters::{InMemoryLedgerStore, InMemoryWalletStore, LogDispatcher, PermissiveResolver};
use meridian_core::config::Config;
use meridian_core::domain::{Rail, Reference, Transaction, TransactionStatus, TransactionType};
use meridian_core::gateway::GatewayError;
use meridian_core::ports::{
    GatewayRail, LedgerStore, PaymentIntent, PaymentIntentRequest, ReferenceError,
    ReferenceResolver,
};
use meridian_core::services::{
    CreateTransactionInput, LedgerService, ReconciliationService, RefundService,
};
use meridian_core::AppState;

pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Clone)]
pub enum GatewayBehavior {
    Succeed,
    Declined(String),
    Unavailable(String),
}

/// Scriptable stand-in for the card provider. Records every call so tests
/// can assert how often the external rail was actually touched.
pub struct MockGateway {
    create_behavior: Mutex<GatewayBehavior>,
    reverse_behavior: Mutex<GatewayBehavior>,
    counter: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub reverse_calls: AtomicUsize,
    pub reversals: Mutex<Vec<(String, BigDecimal, String)>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            create_behavior: Mutex::new(GatewayBehavior::Succeed),
            reverse_behavior: Mutex::new(GatewayBehavior::Succeed),
            counter: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            reverse_calls: AtomicUsize::new(0),
            reversals: Mutex::new(Vec::new()),
        })
    }

    pub fn set_create(&self, behavior: GatewayBehavior) {
        *self.create_behavior.lock().unwrap() = behavior;
    }

    pub fn set_reverse(&self, behavior: GatewayBehavior) {
        *self.reverse_behavior.lock().unwrap() = behavior;
    }

    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn reverse_call_count(&self) -> usize {
        self.reverse_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayRail for MockGateway {
    async fn create_intent(
        &self,
        _req: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.create_behavior.lock().unwrap().clone();
        match behavior {
            GatewayBehavior::Succeed => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(PaymentIntent {
                    external_id: format!("pi_test_{}", n),
                    client_secret: Some(format!("pi_test_{}_secret", n)),
                })
            }
            GatewayBehavior::Declined(reason) => Err(GatewayError::Declined(reason)),
            GatewayBehavior::Unavailable(reason) => Err(GatewayError::Unavailable(reason)),
        }
    }

    async fn reverse(
        &self,
        external_id: &str,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<(), GatewayError> {
        self.reverse_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.reverse_behavior.lock().unwrap().clone();
        match behavior {
            GatewayBehavior::Succeed => {
                self.reversals.lock().unwrap().push((
                    external_id.to_string(),
                    amount.clone(),
                    currency.to_string(),
                ));
                Ok(())
            }
            GatewayBehavior::Declined(reason) => Err(GatewayError::Declined(reason)),
            GatewayBehavior::Unavailable(reason) => Err(GatewayError::Unavailable(reason)),
        }
    }
}

/// Resolver that can be told to reject everything, for reference checks.
pub struct ScriptedResolver {
    pub payable: bool,
    pub completions: AtomicUsize,
}

impl ScriptedResolver {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            payable: true,
            completions: AtomicUsize::new(0),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            payable: false,
            completions: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReferenceResolver for ScriptedResolver {
    async fn verify_payable(&self, reference: &Reference) -> Result<(), ReferenceError> {
        if self.payable {
            Ok(())
        } else {
            Err(ReferenceError::NotFound(format!(
                "{}/{}",
                reference.model.as_str(),
                reference.id
            )))
        }
    }

    async fn apply_completion(
        &self,
        _reference: &Reference,
        _tx: &Transaction,
    ) -> Result<(), ReferenceError> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryLedgerStore>,
    pub wallet: Arc<InMemoryWalletStore>,
    pub gateway: Arc<MockGateway>,
    pub ledger: Arc<LedgerService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub refunds: Arc<RefundService>,
}

pub fn harness() -> Harness {
    harness_with(30, Arc::new(PermissiveResolver))
}

pub fn harness_with(window_days: i64, resolver: Arc<dyn ReferenceResolver>) -> Harness {
    let store = Arc::new(InMemoryLedgerStore::new());
    let wallet = Arc::new(InMemoryWalletStore::new());
    let gateway = MockGateway::new();
    let notifier = Arc::new(LogDispatcher);

    let ledger = Arc::new(LedgerService::new(
        store.clone(),
        wallet.clone(),
        gateway.clone(),
        resolver.clone(),
        notifier.clone(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        store.clone(),
        wallet.clone(),
        resolver,
        notifier.clone(),
    ));
    let refunds = Arc::new(RefundService::new(
        store.clone(),
        wallet.clone(),
        gateway.clone(),
        notifier,
        window_days,
    ));

    Harness {
        store,
        wallet,
        gateway,
        ledger,
        reconciliation,
        refunds,
    }
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: "postgres://unused".to_string(),
        gateway_base_url: "http://gateway.invalid".to_string(),
        gateway_api_key: "sk_test".to_string(),
        gateway_webhook_secret: WEBHOOK_SECRET.to_string(),
        reference_service_url: None,
        refund_window_days: 30,
        sweep_stale_after_minutes: 60,
        sweep_interval_secs: 300,
    }
}

pub fn app_state(h: &Harness) -> AppState {
    AppState {
        config: Arc::new(test_config()),
        ledger: h.ledger.clone(),
        reconciliation: h.reconciliation.clone(),
        refunds: h.refunds.clone(),
    }
}

pub fn tip_input(from: Uuid, to: Uuid, amount: i64, rail: Rail) -> CreateTransactionInput {
    CreateTransactionInput {
        from_user: from,
        to_user: to,
        amount: BigDecimal::from(amount),
        fee: None,
        currency: "USD".to_string(),
        kind: TransactionType::Tip,
        rail,
        payment_method: None,
        reference: None,
        description: None,
        metadata: None,
    }
}

/// Insert an already-completed wallet transaction with a chosen
/// `processed_at`, for exercising the refund window without mocking time.
pub async fn seed_completed_wallet_tx(
    h: &Harness,
    from: Uuid,
    to: Uuid,
    amount: i64,
    fee: i64,
    processed_at: chrono::DateTime<chrono::Utc>,
) -> Transaction {
    let mut tx = Transaction::new(
        from,
        to,
        BigDecimal::from(amount),
        BigDecimal::from(fee),
        "USD".to_string(),
        TransactionType::Tip,
        Rail::Wallet,
        None,
        None,
        None,
    );
    tx.status = TransactionStatus::Completed;
    tx.processed_at = Some(processed_at);
    h.store.insert(&tx).await.unwrap()
}
