//! Bearer credential authentication for Tollgate.
//!
//! Tokens are self-contained: the claims (account id, tier, expiry) are
//! embedded in the token and verified with an HMAC-SHA256 signature, so
//! the hot path never touches a database.
//!
//! Token format: `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`
//!
//! Every failure mode — malformed, expired, bad signature — collapses to
//! the same `AuthError::Unauthorized` so the endpoint cannot be used as a
//! validity oracle.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tollgate_core::{AccountId, AuthError, Tier};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Claims embedded in a bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated account.
    pub account_id: AccountId,

    /// Subscription tier, used to gate admin surfaces.
    pub tier: Tier,

    /// Expiry as unix seconds.
    pub exp: i64,

    /// Issued-at as unix seconds.
    pub iat: i64,
}

impl Claims {
    /// Claims for `account_id` valid for `ttl_secs` from now.
    pub fn new(account_id: AccountId, tier: Tier, ttl_secs: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            account_id,
            tier,
            exp: now + ttl_secs as i64,
            iat: now,
        }
    }
}

/// Validates and mints signed bearer tokens.
pub struct Authenticator {
    key: Vec<u8>,
}

impl Authenticator {
    /// Create an authenticator from the shared signing secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    /// Validate a bearer token and resolve it to its claims.
    ///
    /// No side effects, no storage round trip.
    pub fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(AuthError::Unauthorized)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::Unauthorized)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::Unauthorized)?;

        // Constant-time MAC verification
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| AuthError::Unauthorized)?;
        mac.update(&payload);
        mac.verify_slice(&sig).map_err(|_| AuthError::Unauthorized)?;

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::Unauthorized)?;

        if claims.exp <= Utc::now().timestamp() {
            debug!(account = %claims.account_id, "rejecting expired token");
            return Err(AuthError::Unauthorized);
        }

        Ok(claims)
    }

    /// Sign a token for the given claims. Used at issuance time (signup,
    /// CLI dev tooling) — never on the request hot path.
    pub fn mint(&self, claims: &Claims) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(claims).map_err(|_| AuthError::Unauthorized)?;

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| AuthError::Unauthorized)?;
        mac.update(&payload);
        let sig = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(sig)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn authenticator() -> Authenticator {
        Authenticator::new(SECRET)
    }

    #[test]
    fn mint_then_authenticate_round_trip() {
        let auth = authenticator();
        let claims = Claims::new(AccountId::from("acct-1"), Tier::Standard, 3600);
        let token = auth.mint(&claims).unwrap();

        let resolved = auth.authenticate(&token).unwrap();
        assert_eq!(resolved.account_id, AccountId::from("acct-1"));
        assert_eq!(resolved.tier, Tier::Standard);
    }

    #[test]
    fn expired_token_rejected() {
        let auth = authenticator();
        let mut claims = Claims::new(AccountId::from("acct-1"), Tier::Free, 3600);
        claims.exp = Utc::now().timestamp() - 10;
        let token = auth.mint(&claims).unwrap();

        assert_eq!(auth.authenticate(&token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn wrong_secret_rejected() {
        let auth = authenticator();
        let claims = Claims::new(AccountId::from("acct-1"), Tier::Free, 3600);
        let token = auth.mint(&claims).unwrap();

        let other = Authenticator::new("another-secret-that-is-32-bytes!");
        assert_eq!(other.authenticate(&token), Err(AuthError::Unauthorized));
    }

    #[test]
    fn tampered_payload_rejected() {
        let auth = authenticator();
        let claims = Claims::new(AccountId::from("acct-1"), Tier::Free, 3600);
        let token = auth.mint(&claims).unwrap();

        // Swap in claims for a different account, keep the signature
        let forged_claims = Claims::new(AccountId::from("acct-2"), Tier::Enterprise, 3600);
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let sig = token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{sig}");

        assert_eq!(auth.authenticate(&forged), Err(AuthError::Unauthorized));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let auth = authenticator();
        for bad in ["", "nodot", "two.dots.here.extra", "!!!.???", "YWJj."] {
            assert_eq!(
                auth.authenticate(bad),
                Err(AuthError::Unauthorized),
                "token {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn all_failures_are_indistinguishable() {
        let auth = authenticator();
        let mut expired = Claims::new(AccountId::from("a"), Tier::Free, 3600);
        expired.exp = 0;
        let expired_token = auth.mint(&expired).unwrap();

        let valid = Claims::new(AccountId::from("a"), Tier::Free, 3600);
        let other = Authenticator::new("another-secret-that-is-32-bytes!");
        let forged_token = other.mint(&valid).unwrap();

        let e1 = auth.authenticate(&expired_token).unwrap_err();
        let e2 = auth.authenticate(&forged_token).unwrap_err();
        let e3 = auth.authenticate("garbage").unwrap_err();
        assert_eq!(e1, e2);
        assert_eq!(e2, e3);
    }
}
