//! Configuration loading, validation, and management for Tollgate.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides for secrets. Every recognized field is an explicit struct
//! field — unknown keys are rejected — and `validate()` fails fast at
//! startup with an enumerated list of problems.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The root configuration structure.
///
/// Maps directly to `tollgate.toml`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TollgateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bearer-token authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Credit quota settings.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Vector retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt assembly settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Token-to-credit exchange rates.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Usage ledger and billing reconciliation settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Bearer-token authentication settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC signing secret. Overridable via `TOLLGATE_AUTH_SECRET`.
    #[serde(default)]
    pub secret: String,
    /// Default token lifetime in seconds for minted tokens.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl() -> u64 {
    86_400
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// Credit quota settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Credits granted to a freshly created account.
    #[serde(default = "default_initial_grant")]
    pub initial_grant: u64,
}

fn default_initial_grant() -> u64 {
    1_000
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            initial_grant: default_initial_grant(),
        }
    }
}

/// Vector retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Default number of chunks to retrieve.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum similarity for a chunk to be considered at all.
    #[serde(default)]
    pub min_score: f32,
    /// Stage deadline in milliseconds.
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_retrieval_timeout() -> u64 {
    2_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            timeout_ms: default_retrieval_timeout(),
        }
    }
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Token budget for the assembled prompt.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

fn default_token_budget() -> usize {
    4_096
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
        }
    }
}

/// Generation backend settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Base URL of the OpenAI-compatible backend.
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// API key. Overridable via `TOLLGATE_BACKEND_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent to the backend.
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Default cap on generated tokens per request.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Retry attempt cap for transient backend failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds; doubles per attempt.
    #[serde(default = "default_backoff")]
    pub initial_backoff_ms: u64,
    /// Process-wide cap on outstanding backend calls.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Per-attempt deadline in milliseconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_ms: u64,
}

fn default_backend_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_max_output_tokens() -> u32 {
    1_024
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff() -> u64 {
    250
}
fn default_concurrency() -> usize {
    8
}
fn default_generation_timeout() -> u64 {
    30_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: String::new(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_output_tokens: default_max_output_tokens(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_backoff(),
            max_concurrency: default_concurrency(),
            timeout_ms: default_generation_timeout(),
        }
    }
}

/// Token-to-credit exchange rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Credits per 1 000 prompt tokens.
    #[serde(default = "default_rate")]
    pub input_credits_per_1k: u64,
    /// Credits per 1 000 completion tokens.
    #[serde(default = "default_rate")]
    pub output_credits_per_1k: u64,
}

fn default_rate() -> u64 {
    1
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_credits_per_1k: default_rate(),
            output_credits_per_1k: default_rate(),
        }
    }
}

/// Usage ledger and billing reconciliation settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// SQLite database path; `:memory:` for ephemeral deployments.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Seconds between reconciliation passes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Maximum records flushed per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Billing provider endpoint; empty disables outbound settlement.
    #[serde(default)]
    pub billing_url: String,
    /// Billing API key. Overridable via `TOLLGATE_BILLING_API_KEY`.
    #[serde(default)]
    pub billing_api_key: String,
}

fn default_db_path() -> String {
    "tollgate.db".into()
}
fn default_flush_interval() -> u64 {
    300
}
fn default_batch_size() -> usize {
    500
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            flush_interval_secs: default_flush_interval(),
            batch_size: default_batch_size(),
            billing_url: String::new(),
            billing_api_key: String::new(),
        }
    }
}

// ── Secret redaction ──────────────────────────────────────────────────────

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "None" } else { "[REDACTED]" }
}

impl std::fmt::Debug for TollgateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TollgateConfig")
            .field("server", &self.server)
            .field("auth", &self.auth)
            .field("quota", &self.quota)
            .field("retrieval", &self.retrieval)
            .field("context", &self.context)
            .field("generation", &self.generation)
            .field("pricing", &self.pricing)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &redact(&self.secret))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("db_path", &self.db_path)
            .field("flush_interval_secs", &self.flush_interval_secs)
            .field("batch_size", &self.batch_size)
            .field("billing_url", &self.billing_url)
            .field("billing_api_key", &redact(&self.billing_api_key))
            .finish()
    }
}

// ── Loading & validation ──────────────────────────────────────────────────

/// Errors from configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

impl TollgateConfig {
    /// Load configuration from a TOML file, then apply environment
    /// variable overrides for secrets.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: TollgateConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `TOLLGATE_*` environment variable overrides. Secrets should
    /// come from the environment, not the config file, in production.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TOLLGATE_AUTH_SECRET") {
            self.auth.secret = v;
        }
        if let Ok(v) = std::env::var("TOLLGATE_BACKEND_API_KEY") {
            self.generation.api_key = v;
        }
        if let Ok(v) = std::env::var("TOLLGATE_BILLING_API_KEY") {
            self.ledger.billing_api_key = v;
        }
    }

    /// Validate the configuration, returning every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.auth.secret.is_empty() {
            problems.push("auth.secret must not be empty (set TOLLGATE_AUTH_SECRET)".into());
        } else if self.auth.secret.len() < 32 {
            problems.push("auth.secret must be at least 32 bytes".into());
        }
        if self.auth.token_ttl_secs == 0 {
            problems.push("auth.token_ttl_secs must be positive".into());
        }
        if self.retrieval.top_k == 0 {
            problems.push("retrieval.top_k must be positive".into());
        }
        if self.retrieval.timeout_ms == 0 {
            problems.push("retrieval.timeout_ms must be positive".into());
        }
        if self.context.token_budget == 0 {
            problems.push("context.token_budget must be positive".into());
        }
        if self.generation.max_attempts == 0 {
            problems.push("generation.max_attempts must be positive".into());
        }
        if self.generation.max_concurrency == 0 {
            problems.push("generation.max_concurrency must be positive".into());
        }
        if self.generation.timeout_ms == 0 {
            problems.push("generation.timeout_ms must be positive".into());
        }
        if self.generation.max_output_tokens == 0 {
            problems.push("generation.max_output_tokens must be positive".into());
        }
        if self.pricing.input_credits_per_1k == 0 && self.pricing.output_credits_per_1k == 0 {
            problems.push("pricing: at least one credit rate must be positive".into());
        }
        if self.ledger.batch_size == 0 {
            problems.push("ledger.batch_size must be positive".into());
        }
        if self.ledger.flush_interval_secs == 0 {
            problems.push("ledger.flush_interval_secs must be positive".into());
        }
        if !self.ledger.billing_url.is_empty() && self.ledger.billing_api_key.is_empty() {
            problems.push("ledger.billing_api_key required when billing_url is set".into());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// A commented default config file, written by `tollgate init`.
    pub fn default_toml() -> String {
        let defaults = TollgateConfig::default();
        let mut out = String::from(
            "# Tollgate configuration\n\
             # Secrets (auth.secret, generation.api_key, ledger.billing_api_key)\n\
             # are best supplied via TOLLGATE_AUTH_SECRET, TOLLGATE_BACKEND_API_KEY\n\
             # and TOLLGATE_BILLING_API_KEY environment variables.\n\n",
        );
        out.push_str(&toml::to_string_pretty(&defaults).unwrap_or_default());
        out
    }
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            quota: QuotaConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            generation: GenerationConfig::default(),
            pricing: PricingConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> TollgateConfig {
        let mut config = TollgateConfig::default();
        config.auth.secret = "0123456789abcdef0123456789abcdef".into();
        config
    }

    #[test]
    fn default_config_fails_validation_without_secret() {
        let config = TollgateConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.secret"));
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn short_secret_rejected() {
        let mut config = valid_config();
        config.auth.secret = "too-short".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_collects_all_problems() {
        let mut config = valid_config();
        config.retrieval.top_k = 0;
        config.context.token_budget = 0;
        config.generation.max_attempts = 0;
        match config.validate().unwrap_err() {
            ConfigError::Invalid(problems) => assert_eq!(problems.len(), 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn billing_url_requires_key() {
        let mut config = valid_config();
        config.ledger.billing_url = "https://billing.example.com".into();
        assert!(config.validate().is_err());
        config.ledger.billing_api_key = "bk-123".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            port = 9999

            [retrieval]
            top_k = 3
            "#
        )
        .unwrap();

        let config = TollgateConfig::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.retrieval.top_k, 3);
        // Untouched sections fall back to defaults
        assert_eq!(config.context.token_budget, 4_096);
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server]\nprot = 1234\n").unwrap();
        assert!(TollgateConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = valid_config();
        config.generation.api_key = "sk-very-secret".into();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_parses_back() {
        let text = TollgateConfig::default_toml();
        let parsed: TollgateConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, 8080);
    }
}
