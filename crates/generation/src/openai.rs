//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` and `/embeddings`. Completions
//! are non-streaming; the full response body is the unit of billing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tollgate_config::GenerationConfig;
use tollgate_core::{
    BackendCompletion, BackendRequest, BackendUsage, GenerationBackend, GenerationError,
};
use tracing::{debug, warn};

/// An OpenAI-compatible generation backend.
pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GenerationError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            client,
        })
    }

    /// Map an HTTP status to the error classification the retry loop
    /// keys on.
    async fn classify_failure(response: reqwest::Response) -> GenerationError {
        let status = response.status().as_u16();
        match status {
            429 => GenerationError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            },
            401 | 403 => GenerationError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            ),
            400 => {
                let body = response.text().await.unwrap_or_default();
                GenerationError::InvalidRequest(body)
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                warn!(status, body = %body, "backend returned error");
                GenerationError::Api {
                    status_code: status,
                    message: body,
                }
            }
        }
    }
}

/// Read a `Retry-After` hint from a 429 response.
///
/// Only the delta-seconds form is honored; the HTTP-date form (and a
/// missing or garbled header) falls back to a 5-second default.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(5)
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(
        &self,
        request: BackendRequest,
    ) -> Result<BackendCompletion, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".into(),
                content: Some(system.clone()),
            });
        }
        messages.push(ApiMessage {
            role: "user".into(),
            content: Some(request.prompt.clone()),
        });

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_output_tokens,
            "stream": false,
        });

        debug!(model = %self.model, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        if response.status().as_u16() != 200 {
            return Err(Self::classify_failure(response).await);
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| GenerationError::Api {
            status_code: 200,
            message: format!("failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Api {
                status_code: 200,
                message: "no choices in response".into(),
            })?;

        let usage = api_response.usage.map(|u| BackendUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(BackendCompletion {
            text: choice.message.content.unwrap_or_default(),
            usage,
            model: api_response.model,
        })
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, GenerationError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": inputs,
            "encoding_format": "float",
        });

        debug!(model = %self.embedding_model, count = inputs.len(), "sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        if response.status().as_u16() != 200 {
            return Err(Self::classify_failure(response).await);
        }

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| GenerationError::Api {
                status_code: 200,
                message: format!("failed to parse embedding response: {e}"),
            })?;

        Ok(api_resp.data.into_iter().map(|d| d.embedding).collect())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ApiMessage {
    fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig {
            base_url: "https://api.openai.com/v1/".into(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            max_output_tokens: 1024,
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_concurrency: 8,
            timeout_ms: 30_000,
        }
    }

    #[test]
    fn trailing_slash_trimmed() {
        let backend = OpenAiCompatBackend::new(&config()).unwrap();
        assert_eq!(backend.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.model, "gpt-4o-mini");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Hello")
        );
        assert_eq!(parsed.usage.unwrap().completion_tokens, 3);
    }

    #[test]
    fn parse_response_without_usage() {
        let data = r#"{
            "model": "local",
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn retry_after_header_is_honored() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        assert_eq!(retry_after_secs(&headers), 17);
    }

    #[test]
    fn retry_after_falls_back_without_usable_header() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        assert_eq!(retry_after_secs(&HeaderMap::new()), 5);

        // HTTP-date form is not parsed as a delay.
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after_secs(&headers), 5);
    }

    #[test]
    fn message_serialization() {
        let msg = ApiMessage::new("user", "question");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"question\""));
    }
}
