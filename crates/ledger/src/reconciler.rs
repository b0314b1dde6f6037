//! Billing reconciliation — the periodic flush loop.
//!
//! Each pass drains up to `batch_size` unflushed records, aggregates
//! them per account into a single batch with a deterministic idempotency
//! key, and submits it. On success the records are marked settled; on
//! failure they are marked failed and picked up again on the next pass.
//! A batch that is resubmitted after a lost acknowledgement carries the
//! same key, so the provider can deduplicate it.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tollgate_core::{AccountId, BillingProvider, LedgerError, LedgerStore, UsageBatch, UsageBatchItem, UsageRecord};
use tracing::{debug, error, info};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records settled this pass.
    pub settled: usize,
    /// Records marked failed this pass.
    pub failed: usize,
}

/// The periodic billing flusher.
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn BillingProvider>,
    batch_size: usize,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        provider: Arc<dyn BillingProvider>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            batch_size,
            interval,
        }
    }

    /// Run the flush loop until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            provider = self.provider.name(),
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "reconciler started"
        );

        loop {
            ticker.tick().await;
            match self.flush_once().await {
                Ok(report) if report.settled > 0 || report.failed > 0 => {
                    info!(settled = report.settled, failed = report.failed, "flush pass complete");
                }
                Ok(_) => debug!("flush pass found nothing to do"),
                Err(err) => error!(error = %err, "flush pass errored"),
            }
        }
    }

    /// One reconciliation pass. Public so callers can flush on demand.
    pub async fn flush_once(&self) -> Result<FlushReport, LedgerError> {
        let records = self.store.unflushed(self.batch_size).await?;
        if records.is_empty() {
            return Ok(FlushReport::default());
        }

        let batch = Self::build_batch(&records);
        let record_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        match self.provider.submit_batch(batch).await {
            Ok(()) => {
                self.store.mark_settled(&record_ids, Utc::now()).await?;
                Ok(FlushReport {
                    settled: record_ids.len(),
                    failed: 0,
                })
            }
            Err(err) => {
                error!(error = %err, records = record_ids.len(), "batch submission failed, will retry");
                self.store.mark_failed(&record_ids).await?;
                Ok(FlushReport {
                    settled: 0,
                    failed: record_ids.len(),
                })
            }
        }
    }

    /// Aggregate records into a batch. The idempotency key is a digest
    /// of the sorted member record ids: the same set of records always
    /// produces the same key, regardless of ordering or retry count.
    fn build_batch(records: &[UsageRecord]) -> UsageBatch {
        let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();

        let mut hasher = Sha256::new();
        for id in &ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        let idempotency_key = format!("{:x}", hasher.finalize());

        let period_start = records
            .iter()
            .map(|r| r.created_at)
            .min()
            .unwrap_or_else(Utc::now);
        let period_end = records
            .iter()
            .map(|r| r.created_at)
            .max()
            .unwrap_or_else(Utc::now);

        let mut per_account: HashMap<AccountId, UsageBatchItem> = HashMap::new();
        for record in records {
            let item = per_account
                .entry(record.account_id.clone())
                .or_insert_with(|| UsageBatchItem {
                    account_id: record.account_id.clone(),
                    credits: 0,
                    record_count: 0,
                });
            item.credits += record.cost;
            item.record_count += 1;
        }

        let mut items: Vec<UsageBatchItem> = per_account.into_values().collect();
        items.sort_by(|a, b| a.account_id.as_str().cmp(b.account_id.as_str()));

        UsageBatch {
            idempotency_key,
            period_start,
            period_end,
            items,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tollgate_core::SettlementStatus;

    /// Mock provider that can be toggled between accepting and failing,
    /// and records the keys it saw.
    struct TogglingProvider {
        failing: AtomicBool,
        calls: AtomicUsize,
        keys: Mutex<Vec<String>>,
    }

    impl TogglingProvider {
        fn accepting() -> Self {
            Self {
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                keys: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            let p = Self::accepting();
            p.failing.store(true, Ordering::SeqCst);
            p
        }

        fn recover(&self) {
            self.failing.store(false, Ordering::SeqCst);
        }

        fn seen_keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BillingProvider for TogglingProvider {
        fn name(&self) -> &str {
            "toggling"
        }

        async fn submit_batch(&self, batch: UsageBatch) -> Result<(), LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().unwrap().push(batch.idempotency_key.clone());
            if self.failing.load(Ordering::SeqCst) {
                return Err(LedgerError::Billing("endpoint down".into()));
            }
            Ok(())
        }
    }

    async fn seeded_store(n: usize) -> Arc<InMemoryLedgerStore> {
        let store = Arc::new(InMemoryLedgerStore::new());
        let account = AccountId::generate();
        for i in 0..n {
            store
                .insert_if_absent(UsageRecord::new(
                    format!("q-{i}"),
                    account.clone(),
                    100,
                    50,
                    2,
                ))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn successful_flush_settles_records() {
        let store = seeded_store(3).await;
        let provider = Arc::new(TogglingProvider::accepting());
        let reconciler = Reconciler::new(
            store.clone(),
            provider.clone(),
            100,
            Duration::from_secs(300),
        );

        let report = reconciler.flush_once().await.unwrap();
        assert_eq!(report.settled, 3);
        assert_eq!(report.failed, 0);
        assert!(store.unflushed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_flush_marks_failed_and_retries() {
        let store = seeded_store(2).await;
        let provider = Arc::new(TogglingProvider::failing());
        let reconciler = Reconciler::new(
            store.clone(),
            provider.clone(),
            100,
            Duration::from_secs(300),
        );

        let report = reconciler.flush_once().await.unwrap();
        assert_eq!(report.failed, 2);

        for record in store.unflushed(10).await.unwrap() {
            assert_eq!(record.status, SettlementStatus::Failed);
        }

        // Endpoint recovers; the next pass settles the same records.
        provider.recover();
        let report = reconciler.flush_once().await.unwrap();
        assert_eq!(report.settled, 2);
        assert!(store.unflushed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retried_batch_reuses_idempotency_key() {
        let store = seeded_store(2).await;
        let provider = Arc::new(TogglingProvider::failing());
        let reconciler = Reconciler::new(
            store.clone(),
            provider.clone(),
            100,
            Duration::from_secs(300),
        );

        reconciler.flush_once().await.unwrap();
        provider.recover();
        reconciler.flush_once().await.unwrap();

        let keys = provider.seen_keys();
        assert_eq!(keys.len(), 2);
        // Same record set → same key, so the provider can deduplicate.
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn batch_aggregates_per_account() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let alice = AccountId("alice".into());
        let bob = AccountId("bob".into());

        store
            .insert_if_absent(UsageRecord::new("q-1", alice.clone(), 10, 5, 3))
            .await
            .unwrap();
        store
            .insert_if_absent(UsageRecord::new("q-2", alice.clone(), 10, 5, 4))
            .await
            .unwrap();
        store
            .insert_if_absent(UsageRecord::new("q-3", bob.clone(), 10, 5, 9))
            .await
            .unwrap();

        let records = store.unflushed(10).await.unwrap();
        let batch = Reconciler::build_batch(&records);

        assert_eq!(batch.items.len(), 2);
        let alice_item = batch
            .items
            .iter()
            .find(|i| i.account_id == alice)
            .unwrap();
        assert_eq!(alice_item.credits, 7);
        assert_eq!(alice_item.record_count, 2);
    }

    #[tokio::test]
    async fn empty_store_is_a_noop() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let provider = Arc::new(TogglingProvider::accepting());
        let reconciler = Reconciler::new(
            store,
            provider.clone(),
            100,
            Duration::from_secs(300),
        );

        let report = reconciler.flush_once().await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn batch_size_bounds_a_pass() {
        let store = seeded_store(10).await;
        let provider = Arc::new(TogglingProvider::accepting());
        let reconciler = Reconciler::new(
            store.clone(),
            provider,
            4,
            Duration::from_secs(300),
        );

        let report = reconciler.flush_once().await.unwrap();
        assert_eq!(report.settled, 4);
        assert_eq!(store.unflushed(100).await.unwrap().len(), 6);
    }
}
