//! The usage ledger facade.
//!
//! One call per completed query: `record` charges exactly once per
//! query id no matter how often it is replayed, and reports whether the
//! call was the first.

use std::sync::Arc;
use tollgate_core::{AccountId, AccountUsageTotals, LedgerError, LedgerStore, UsageRecord};
use tracing::{debug, info};

/// Outcome of recording usage for a query.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// The authoritative record for this query id.
    pub record: UsageRecord,
    /// False when an earlier call already charged this query.
    pub first_write: bool,
}

/// Idempotent write path over a [`LedgerStore`].
pub struct UsageLedger {
    store: Arc<dyn LedgerStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Record usage for a completed query. Replays return the original
    /// record and charge nothing.
    pub async fn record(
        &self,
        query_id: &str,
        account_id: AccountId,
        input_tokens: u32,
        output_tokens: u32,
        cost: u64,
    ) -> Result<RecordOutcome, LedgerError> {
        let candidate = UsageRecord::new(query_id, account_id, input_tokens, output_tokens, cost);
        let candidate_id = candidate.id.clone();

        let stored = self.store.insert_if_absent(candidate).await?;
        let first_write = stored.id == candidate_id;

        if first_write {
            info!(
                query_id,
                account = %stored.account_id,
                cost = stored.cost,
                input_tokens,
                output_tokens,
                "usage recorded"
            );
        } else {
            debug!(query_id, "usage already recorded, replay ignored");
        }

        Ok(RecordOutcome {
            record: stored,
            first_write,
        })
    }

    /// Aggregated usage for one account.
    pub async fn totals(&self, account_id: &AccountId) -> Result<AccountUsageTotals, LedgerError> {
        self.store.account_totals(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;

    #[tokio::test]
    async fn first_record_charges() {
        let ledger = UsageLedger::new(Arc::new(InMemoryLedgerStore::new()));
        let account = AccountId::generate();

        let outcome = ledger
            .record("q-1", account.clone(), 100, 50, 3)
            .await
            .unwrap();
        assert!(outcome.first_write);
        assert_eq!(outcome.record.cost, 3);

        let totals = ledger.totals(&account).await.unwrap();
        assert_eq!(totals.credits, 3);
    }

    #[tokio::test]
    async fn replay_does_not_double_charge() {
        let ledger = UsageLedger::new(Arc::new(InMemoryLedgerStore::new()));
        let account = AccountId::generate();

        ledger
            .record("q-1", account.clone(), 100, 50, 3)
            .await
            .unwrap();
        let replay = ledger
            .record("q-1", account.clone(), 100, 50, 3)
            .await
            .unwrap();

        assert!(!replay.first_write);
        let totals = ledger.totals(&account).await.unwrap();
        assert_eq!(totals.record_count, 1);
        assert_eq!(totals.credits, 3);
    }
}
