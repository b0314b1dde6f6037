//! Usage records — the append-only charge ledger entries.
//!
//! Each completed query produces exactly one `UsageRecord`, keyed by the
//! query request id. The ledger store trait is defined here; the
//! in-memory and SQLite implementations live in `tollgate-ledger`.

use crate::account::AccountId;
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement status of a usage record against the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    /// Charged locally, not yet flushed to the billing provider.
    Pending,
    /// Acknowledged by the billing provider.
    Settled,
    /// Last flush attempt failed; will be retried on the next pass.
    Failed,
}

/// An append-only entry linking a query request to a charged amount.
///
/// Invariant: at most one record exists per query request id, however
/// many times `record` is replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record id.
    pub id: String,

    /// The query request this record charges — the idempotency key.
    pub query_id: String,

    /// The charged account.
    pub account_id: AccountId,

    /// Locally metered prompt tokens.
    pub input_tokens: u32,

    /// Locally metered completion tokens.
    pub output_tokens: u32,

    /// Charged credits.
    pub cost: u64,

    /// Settlement status against the billing provider.
    pub status: SettlementStatus,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was acknowledged by the billing provider, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flushed_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    /// Create a fresh pending record for a query.
    pub fn new(
        query_id: impl Into<String>,
        account_id: AccountId,
        input_tokens: u32,
        output_tokens: u32,
        cost: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query_id: query_id.into(),
            account_id,
            input_tokens,
            output_tokens,
            cost,
            status: SettlementStatus::Pending,
            created_at: Utc::now(),
            flushed_at: None,
        }
    }
}

/// Aggregated usage for one account, served by the usage endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUsageTotals {
    pub record_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub credits: u64,
}

/// Durable storage for usage records.
///
/// `insert_if_absent` is the idempotency primitive: the first insert for
/// a query id wins, later replays return the original record.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// A human-readable name for this store.
    fn name(&self) -> &str;

    /// Insert `record` unless a record for the same query id already
    /// exists. Returns the stored record (the original on replay).
    async fn insert_if_absent(
        &self,
        record: UsageRecord,
    ) -> std::result::Result<UsageRecord, LedgerError>;

    /// Fetch a record by query id.
    async fn get_by_query(
        &self,
        query_id: &str,
    ) -> std::result::Result<Option<UsageRecord>, LedgerError>;

    /// Oldest unflushed records (Pending or Failed), bounded by `limit`.
    async fn unflushed(&self, limit: usize)
    -> std::result::Result<Vec<UsageRecord>, LedgerError>;

    /// Mark a set of records settled at `flushed_at`.
    async fn mark_settled(
        &self,
        record_ids: &[String],
        flushed_at: DateTime<Utc>,
    ) -> std::result::Result<(), LedgerError>;

    /// Mark a set of records failed (flush attempt did not go through).
    async fn mark_failed(&self, record_ids: &[String]) -> std::result::Result<(), LedgerError>;

    /// Aggregate totals for one account.
    async fn account_totals(
        &self,
        account_id: &AccountId,
    ) -> std::result::Result<AccountUsageTotals, LedgerError>;
}
