//! `tollgate mint-token` — sign a bearer token for an account.
//!
//! Development tooling: production token issuance belongs to whatever
//! signup system fronts the gateway, not this binary.

use std::path::Path;
use tollgate_auth::{Authenticator, Claims};
use tollgate_core::{AccountId, Tier};

pub fn run(
    config_path: &Path,
    account: &str,
    tier: &str,
    ttl_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    if config.auth.secret.is_empty() {
        return Err("auth.secret is empty — set TOLLGATE_AUTH_SECRET".into());
    }

    let tier = parse_tier(tier)?;
    let ttl = ttl_secs.unwrap_or(config.auth.token_ttl_secs);

    let auth = Authenticator::new(&config.auth.secret);
    let claims = Claims::new(AccountId::from(account), tier, ttl);
    let token = auth.mint(&claims)?;

    println!("Account: {account}");
    println!("Tier:    {tier}");
    println!("Expires: {} (unix seconds)", claims.exp);
    println!();
    println!("{token}");

    Ok(())
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    match s.to_ascii_lowercase().as_str() {
        "free" => Ok(Tier::Free),
        "standard" => Ok(Tier::Standard),
        "enterprise" => Ok(Tier::Enterprise),
        other => Err(format!(
            "unknown tier {other:?} (expected free, standard, or enterprise)"
        )),
    }
}
