//! Housekeeping for abandoned gateway transactions: a pending row whose
//! provider event never arrives is swept to `failed` after a configured age.
//! Not invariant-bearing; wallet-rail rows settle synchronously and are
//! never touched.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::ports::LedgerStore;

pub struct Sweeper {
    store: Arc<dyn LedgerStore>,
    max_age: chrono::Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn LedgerStore>, max_age_minutes: i64) -> Self {
        Self {
            store,
            max_age: chrono::Duration::minutes(max_age_minutes),
        }
    }

    pub async fn sweep_once(&self) -> Result<u64, AppError> {
        let cutoff = Utc::now() - self.max_age;
        let swept = self.store.sweep_stale_pending(cutoff).await?;
        if swept > 0 {
            tracing::info!(swept, "swept abandoned gateway transactions to failed");
        }
        Ok(swept)
    }

    /// Periodic loop for the server process.
    pub async fn run(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                tracing::error!(error = %err, "stale-pending sweep failed");
            }
        }
    }
}
