//! In-memory ledger store.
//!
//! Keeps all records in a mutex-guarded map keyed by query id. Used in
//! tests and dev setups; production uses the SQLite store.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tollgate_core::{AccountId, AccountUsageTotals, LedgerError, LedgerStore, SettlementStatus, UsageRecord};
use async_trait::async_trait;

/// A non-durable ledger store.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    records: Mutex<HashMap<String, UsageRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records, any status.
    pub fn len(&self) -> usize {
        self.records.lock().expect("ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn insert_if_absent(&self, record: UsageRecord) -> Result<UsageRecord, LedgerError> {
        let mut records = self.records.lock().expect("ledger lock poisoned");
        Ok(records
            .entry(record.query_id.clone())
            .or_insert(record)
            .clone())
    }

    async fn get_by_query(&self, query_id: &str) -> Result<Option<UsageRecord>, LedgerError> {
        let records = self.records.lock().expect("ledger lock poisoned");
        Ok(records.get(query_id).cloned())
    }

    async fn unflushed(&self, limit: usize) -> Result<Vec<UsageRecord>, LedgerError> {
        let records = self.records.lock().expect("ledger lock poisoned");
        let mut pending: Vec<UsageRecord> = records
            .values()
            .filter(|r| r.status != SettlementStatus::Settled)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_settled(
        &self,
        record_ids: &[String],
        flushed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.lock().expect("ledger lock poisoned");
        for record in records.values_mut() {
            if record_ids.contains(&record.id) {
                record.status = SettlementStatus::Settled;
                record.flushed_at = Some(flushed_at);
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, record_ids: &[String]) -> Result<(), LedgerError> {
        let mut records = self.records.lock().expect("ledger lock poisoned");
        for record in records.values_mut() {
            if record_ids.contains(&record.id) && record.status != SettlementStatus::Settled {
                record.status = SettlementStatus::Failed;
            }
        }
        Ok(())
    }

    async fn account_totals(
        &self,
        account_id: &AccountId,
    ) -> Result<AccountUsageTotals, LedgerError> {
        let records = self.records.lock().expect("ledger lock poisoned");
        let mut totals = AccountUsageTotals::default();
        for record in records.values().filter(|r| &r.account_id == account_id) {
            totals.record_count += 1;
            totals.input_tokens += record.input_tokens as u64;
            totals.output_tokens += record.output_tokens as u64;
            totals.credits += record.cost;
        }
        Ok(totals)
    }
}
