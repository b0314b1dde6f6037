//! Usage ledger for Tollgate.
//!
//! The ledger is the append-only record of what was actually charged.
//! Writes are idempotent by query id; settlement against the external
//! billing provider happens asynchronously in batches.

pub mod billing;
pub mod ledger;
pub mod memory;
pub mod reconciler;
pub mod sqlite;

pub use billing::{HttpBillingProvider, NoopBillingProvider};
pub use ledger::{RecordOutcome, UsageLedger};
pub use memory::InMemoryLedgerStore;
pub use reconciler::{FlushReport, Reconciler};
pub use sqlite::SqliteLedgerStore;
