//! Query request lifecycle.
//!
//! A `QueryRequest` tracks one inbound call through the pipeline state
//! machine:
//!
//! ```text
//! received → reserved → retrieved → generated → settled
//!     │          │           │
//!     ▼          ▼           ▼
//!  rejected  retrieval_   generation_
//!             failed       failed
//! ```
//!
//! The four terminal states are `settled`, `rejected`, `retrieval_failed`
//! and `generation_failed`. Once the usage ledger records a request it is
//! immutable.

use crate::account::AccountId;
use crate::chunk::ChunkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state of a query request within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Reserved,
    Retrieved,
    Generated,
    Settled,
    Rejected,
    RetrievalFailed,
    GenerationFailed,
}

impl RequestState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Settled | Self::Rejected | Self::RetrievalFailed | Self::GenerationFailed
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Reserved)
                | (Received, Rejected)
                | (Reserved, Retrieved)
                | (Reserved, RetrievalFailed)
                | (Retrieved, Generated)
                | (Retrieved, GenerationFailed)
                | (Generated, Settled)
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Reserved => "reserved",
            Self::Retrieved => "retrieved",
            Self::Generated => "generated",
            Self::Settled => "settled",
            Self::Rejected => "rejected",
            Self::RetrievalFailed => "retrieval_failed",
            Self::GenerationFailed => "generation_failed",
        };
        f.write_str(s)
    }
}

/// One inbound query call. Created per request; immutable once the usage
/// ledger records it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Unique request id. Doubles as the ledger idempotency key.
    pub id: String,

    /// The account issuing the query.
    pub account_id: AccountId,

    /// Raw query text as received.
    pub query: String,

    /// When the request arrived.
    pub received_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub state: RequestState,

    /// Chunks resolved by retrieval, in similarity order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_ids: Vec<ChunkId>,

    /// Locally metered prompt tokens (set after generation).
    #[serde(default)]
    pub input_tokens: u32,

    /// Locally metered completion tokens (set after generation).
    #[serde(default)]
    pub output_tokens: u32,

    /// Final cost in credits (set at settlement).
    #[serde(default)]
    pub cost: u64,
}

/// Error for an illegal state transition — a programming bug, not a
/// runtime condition.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal transition {from} → {to} for request {request_id}")]
pub struct IllegalTransition {
    pub request_id: String,
    pub from: RequestState,
    pub to: RequestState,
}

impl QueryRequest {
    /// Create a new request in the `Received` state.
    pub fn new(account_id: AccountId, query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            query: query.into(),
            received_at: Utc::now(),
            state: RequestState::Received,
            chunk_ids: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0,
        }
    }

    /// Advance the state machine, rejecting illegal transitions.
    pub fn transition(&mut self, next: RequestState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                request_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QueryRequest {
        QueryRequest::new(AccountId::generate(), "what is a reservation?")
    }

    #[test]
    fn happy_path_transitions() {
        let mut req = request();
        assert_eq!(req.state, RequestState::Received);
        req.transition(RequestState::Reserved).unwrap();
        req.transition(RequestState::Retrieved).unwrap();
        req.transition(RequestState::Generated).unwrap();
        req.transition(RequestState::Settled).unwrap();
        assert!(req.state.is_terminal());
    }

    #[test]
    fn failure_exits() {
        let mut req = request();
        req.transition(RequestState::Rejected).unwrap();
        assert!(req.state.is_terminal());

        let mut req = request();
        req.transition(RequestState::Reserved).unwrap();
        req.transition(RequestState::RetrievalFailed).unwrap();
        assert!(req.state.is_terminal());

        let mut req = request();
        req.transition(RequestState::Reserved).unwrap();
        req.transition(RequestState::Retrieved).unwrap();
        req.transition(RequestState::GenerationFailed).unwrap();
        assert!(req.state.is_terminal());
    }

    #[test]
    fn illegal_transitions_rejected() {
        let mut req = request();
        // Cannot settle straight from received
        assert!(req.transition(RequestState::Settled).is_err());
        // Cannot reject after reservation
        req.transition(RequestState::Reserved).unwrap();
        assert!(req.transition(RequestState::Rejected).is_err());
        // Terminal states admit nothing
        req.transition(RequestState::RetrievalFailed).unwrap();
        assert!(req.transition(RequestState::Retrieved).is_err());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&RequestState::RetrievalFailed).unwrap();
        assert_eq!(json, "\"retrieval_failed\"");
    }
}
