//! Error types for the Tollgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Tollgate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Authentication errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Quota errors ---
    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Ledger errors ---
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Credential validation failures.
///
/// Deliberately a single opaque variant: expired, malformed, and
/// wrong-signature tokens must be indistinguishable to callers so the
/// endpoint cannot be used as a signing oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,
}

#[derive(Debug, Clone, Error)]
pub enum QuotaError {
    #[error("insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: u64, available: u64 },

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("account deactivated: {0}")]
    AccountInactive(String),

    #[error("unknown reservation: {0}")]
    UnknownReservation(String),

    #[error("account already exists: {0}")]
    AccountExists(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("retrieval timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("backend request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("backend timed out: {0}")]
    Timeout(String),

    #[error("backend authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    AttemptsExhausted { attempts: u32, last: String },
}

impl GenerationError {
    /// Whether a bounded retry is worthwhile.
    ///
    /// Throttling, server faults, network failures, and timeouts are
    /// transient. Malformed requests and bad credentials are not — the
    /// same request will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_)
            | Self::InvalidRequest(_)
            | Self::AttemptsExhausted { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("billing provider error: {0}")]
    Billing(String),
}
