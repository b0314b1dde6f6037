//! Generation backend trait — the abstraction over the external LLM.
//!
//! The backend is opaque and rate-limited; Tollgate only needs a
//! completion call and an embedding call. Retry policy, concurrency
//! capping, and token accounting live in the generation client, not
//! here — an implementation reports errors once and lets the client
//! decide whether they are worth retrying.

use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single completion request to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// The fully assembled prompt text.
    pub prompt: String,

    /// Optional system preamble, sent separately where the wire format
    /// supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Hard cap on generated tokens.
    pub max_output_tokens: u32,
}

/// Token usage as reported by the backend.
///
/// Used only for cross-validation against our local metering — never as
/// the billing source of truth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackendUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A complete response from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCompletion {
    /// The generated text.
    pub text: String,

    /// Provider-reported usage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BackendUsage>,

    /// Which model actually responded.
    pub model: String,
}

/// The generation backend trait.
///
/// Implementations: OpenAI-compatible HTTP endpoints and test mocks.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Send one completion request. No retries — classification of the
    /// returned error drives the caller's retry loop.
    async fn complete(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<BackendCompletion, GenerationError>;

    /// Embed a batch of texts, one vector per input.
    async fn embed(
        &self,
        inputs: Vec<String>,
    ) -> std::result::Result<Vec<Vec<f32>>, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_request_serialization() {
        let req = BackendRequest {
            prompt: "Answer the question.".into(),
            system: None,
            max_output_tokens: 256,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("max_output_tokens"));
        // Absent system prompt is omitted entirely
        assert!(!json.contains("system"));
    }
}
