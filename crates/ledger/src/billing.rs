//! Billing provider implementations.
//!
//! `HttpBillingProvider` posts usage batches to an external billing
//! endpoint with the batch's idempotency key in a header, so a batch
//! resubmitted after a network failure settles at most once on the
//! provider side. `NoopBillingProvider` acknowledges everything and is
//! used when no billing endpoint is configured.

use async_trait::async_trait;
use tollgate_core::{BillingProvider, LedgerError, UsageBatch};
use tracing::{debug, info, warn};

/// Posts batches to an HTTP billing endpoint.
pub struct HttpBillingProvider {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpBillingProvider {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| LedgerError::Billing(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit_batch(&self, batch: UsageBatch) -> Result<(), LedgerError> {
        debug!(
            idempotency_key = %batch.idempotency_key,
            items = batch.items.len(),
            "submitting usage batch"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Idempotency-Key", &batch.idempotency_key)
            .json(&batch)
            .send()
            .await
            .map_err(|e| LedgerError::Billing(format!("batch submission failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "billing provider rejected batch");
            return Err(LedgerError::Billing(format!(
                "billing provider returned {status}: {body}"
            )));
        }

        info!(idempotency_key = %batch.idempotency_key, "usage batch accepted");
        Ok(())
    }
}

/// Accepts every batch without sending it anywhere.
#[derive(Default)]
pub struct NoopBillingProvider;

#[async_trait]
impl BillingProvider for NoopBillingProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn submit_batch(&self, batch: UsageBatch) -> Result<(), LedgerError> {
        debug!(
            idempotency_key = %batch.idempotency_key,
            items = batch.items.len(),
            "billing disabled, batch acknowledged locally"
        );
        Ok(())
    }
}
