//! Billing provider trait — the outbound settlement interface.
//!
//! Tollgate never mirrors the payment provider's ledger; it only submits
//! batched usage and reacts to the result. Batches carry an idempotency
//! key so a replayed submission is detectable on the provider side.

use crate::account::AccountId;
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One account's usage within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBatchItem {
    pub account_id: AccountId,
    /// Total credits charged across the batched records.
    pub credits: u64,
    /// Number of usage records aggregated into this item.
    pub record_count: usize,
}

/// A batch of settled usage to submit to the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBatch {
    /// Deterministic idempotency key derived from the member record ids.
    /// Submitting the same batch twice must have effect at most once.
    pub idempotency_key: String,

    /// Start of the covered period.
    pub period_start: DateTime<Utc>,

    /// End of the covered period.
    pub period_end: DateTime<Utc>,

    /// Per-account aggregated usage.
    pub items: Vec<UsageBatchItem>,
}

/// The billing provider trait.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Submit a usage batch. Must be safe to call again with the same
    /// `idempotency_key` after a failure.
    async fn submit_batch(&self, batch: UsageBatch) -> std::result::Result<(), LedgerError>;
}
