//! `tollgate serve` — start the HTTP gateway.
//!
//! Wires every subsystem once and shares them via `Arc`: quota store,
//! vector index, generation client, SQLite-backed ledger, and the
//! billing reconciler running as a background task.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tollgate_auth::{Authenticator, Claims};
use tollgate_core::{BillingProvider, Tier};
use tollgate_engine::Engine;
use tollgate_gateway::GatewayState;
use tollgate_generation::{GenerationClient, OpenAiCompatBackend};
use tollgate_ledger::{
    HttpBillingProvider, NoopBillingProvider, Reconciler, SqliteLedgerStore, UsageLedger,
};
use tollgate_quota::QuotaStore;
use tollgate_retrieval::InMemoryIndex;
use tracing::info;

pub async fn run(
    config_path: &Path,
    port_override: Option<u16>,
    dev_account: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port_override {
        config.server.port = port;
    }
    config.validate()?;

    let auth = Arc::new(Authenticator::new(&config.auth.secret));
    let quota = Arc::new(QuotaStore::new(config.quota.initial_grant));
    let index = Arc::new(InMemoryIndex::new(config.retrieval.min_score));

    let backend = Arc::new(OpenAiCompatBackend::new(&config.generation)?);
    let generation = Arc::new(GenerationClient::new(backend, &config.generation));

    let store = Arc::new(SqliteLedgerStore::new(&config.ledger.db_path).await?);
    let ledger = Arc::new(UsageLedger::new(store.clone()));

    let provider: Arc<dyn BillingProvider> = if config.ledger.billing_url.is_empty() {
        Arc::new(NoopBillingProvider)
    } else {
        Arc::new(HttpBillingProvider::new(
            &config.ledger.billing_url,
            &config.ledger.billing_api_key,
        )?)
    };
    let reconciler = Reconciler::new(
        store,
        provider,
        config.ledger.batch_size,
        Duration::from_secs(config.ledger.flush_interval_secs),
    );
    tokio::spawn(reconciler.run());

    let engine = Arc::new(Engine::new(
        &config,
        quota.clone(),
        index,
        generation,
        ledger,
    ));

    if dev_account {
        let account = quota.create_account("dev", Tier::Enterprise);
        let claims = Claims::new(account.id.clone(), Tier::Enterprise, config.auth.token_ttl_secs);
        let token = auth.mint(&claims)?;
        println!("🔑 Development account: {}", account.id);
        println!("   Bearer token: {token}");
    }

    info!(model = %config.generation.model, db = %config.ledger.db_path, "tollgate configured");

    let state = Arc::new(GatewayState { engine, auth });
    tollgate_gateway::serve(&config.server.host, config.server.port, state).await
}
