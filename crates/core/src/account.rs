//! Account identity and subscription tier.
//!
//! The credit balance does NOT live on `Account` — balances are owned by
//! the quota store, which is the only component allowed to mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque account identifier (uuid text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Generate a fresh random account id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Subscription tier. Gates admin surfaces (document ingestion), not the
/// query path — the query path is gated by credit alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Standard,
    Enterprise,
}

impl Tier {
    /// Whether this tier may manage the document index.
    pub fn can_manage_documents(&self) -> bool {
        matches!(self, Tier::Enterprise)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => f.write_str("free"),
            Tier::Standard => f.write_str("standard"),
            Tier::Enterprise => f.write_str("enterprise"),
        }
    }
}

/// An account. Created on signup, never deleted — only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account id.
    pub id: AccountId,

    /// Human-readable name.
    pub name: String,

    /// Subscription tier.
    pub tier: Tier,

    /// Deactivated accounts keep their history but cannot authenticate
    /// new work.
    pub active: bool,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account.
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: AccountId::generate(),
            name: name.into(),
            tier,
            active: true,
            created_at: Utc::now(),
        }
    }
}
