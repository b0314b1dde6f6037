//! Pipeline errors.
//!
//! Each stage's error keeps its own type so the HTTP layer can map the
//! failure class without inspecting messages.

use thiserror::Error;
use tollgate_core::{GenerationError, LedgerError, QuotaError, RetrievalError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("internal: {0}")]
    Internal(String),
}
