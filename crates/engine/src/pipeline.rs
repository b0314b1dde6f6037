//! The query pipeline.
//!
//! Drives one request through reserve → retrieve → assemble → generate
//! → settle → record. Credit safety is the invariant that matters:
//! every failure exit releases the reservation in full, and the release
//! is owned by an RAII guard so an early return or panic between
//! reserve and settle cannot leak held credits.

use crate::chunker::{self, DEFAULT_CHUNK_CHARS};
use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tollgate_config::TollgateConfig;
use tollgate_context::PromptAssembler;
use tollgate_core::{
    Chunk, CostModel, QueryRequest, RequestState, RetrievalError, Retriever, ScoredChunk,
};
use tollgate_generation::GenerationClient;
use tollgate_ledger::UsageLedger;
use tollgate_quota::QuotaStore;
use tollgate_retrieval::InMemoryIndex;
use tracing::{debug, error, info, instrument, warn};

/// The answer to a settled query, plus its billing facts.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// The finished request, in a terminal state.
    pub request: QueryRequest,
    /// The generated answer text.
    pub answer: String,
    /// Which model produced it.
    pub model: String,
    /// Credits refunded at settlement (estimate minus actual).
    pub refunded: u64,
    /// Balance remaining after settlement.
    pub balance_remaining: u64,
}

/// Per-request overrides for the query path. Absent fields fall back to
/// the configured defaults; the output cap can only tighten, never
/// exceed, the configured maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub max_output_tokens: Option<u32>,
    pub top_k: Option<usize>,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub chunks: usize,
    pub index_version: u64,
}

/// Owns the release of a quota reservation.
///
/// Disarmed at settlement; on any other exit path the drop releases the
/// full hold.
struct ReservationGuard {
    quota: Arc<QuotaStore>,
    reservation_id: Option<String>,
}

impl ReservationGuard {
    fn new(quota: Arc<QuotaStore>, reservation_id: String) -> Self {
        Self {
            quota,
            reservation_id: Some(reservation_id),
        }
    }

    /// Take ownership of the reservation for settlement.
    fn disarm(&mut self) -> Option<String> {
        self.reservation_id.take()
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if let Some(id) = self.reservation_id.take() {
            if let Err(err) = self.quota.release(&id) {
                warn!(reservation = %id, error = %err, "failed to release reservation");
            }
        }
    }
}

/// The pipeline itself. One instance serves all requests.
pub struct Engine {
    quota: Arc<QuotaStore>,
    index: Arc<InMemoryIndex>,
    retriever: Arc<dyn Retriever>,
    assembler: PromptAssembler,
    generation: Arc<GenerationClient>,
    ledger: Arc<UsageLedger>,
    cost_model: CostModel,
    top_k: usize,
    retrieval_timeout: Duration,
}

impl Engine {
    pub fn new(
        config: &TollgateConfig,
        quota: Arc<QuotaStore>,
        index: Arc<InMemoryIndex>,
        generation: Arc<GenerationClient>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            quota,
            retriever: index.clone(),
            index,
            assembler: PromptAssembler::new(config.context.token_budget),
            generation,
            ledger,
            cost_model: CostModel::new(
                config.pricing.input_credits_per_1k,
                config.pricing.output_credits_per_1k,
            ),
            top_k: config.retrieval.top_k,
            retrieval_timeout: Duration::from_millis(config.retrieval.timeout_ms),
        }
    }

    /// Swap the retriever seam (alternative backends, tests).
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn quota(&self) -> &Arc<QuotaStore> {
        &self.quota
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn index(&self) -> &Arc<InMemoryIndex> {
        &self.index
    }

    // ── Query path ───────────────────────────────────────────────────

    /// Run one query end to end with the configured defaults.
    pub async fn execute(
        &self,
        request_account: tollgate_core::AccountId,
        query: &str,
    ) -> Result<QueryOutcome, EngineError> {
        self.execute_with(request_account, query, QueryOptions::default())
            .await
    }

    /// Run one query end to end.
    #[instrument(skip(self, query, options), fields(account = %request_account))]
    pub async fn execute_with(
        &self,
        request_account: tollgate_core::AccountId,
        query: &str,
        options: QueryOptions,
    ) -> Result<QueryOutcome, EngineError> {
        let max_output = options
            .max_output_tokens
            .unwrap_or_else(|| self.generation.max_output_tokens())
            .min(self.generation.max_output_tokens())
            .max(1);
        let top_k = options.top_k.unwrap_or(self.top_k).max(1);
        let mut request = QueryRequest::new(request_account.clone(), query);
        debug!(request = %request.id, "query received");

        if query.trim().is_empty() {
            self.to_terminal(&mut request, RequestState::Rejected);
            return Err(EngineError::InvalidQuery("query must not be empty".into()));
        }
        // The query alone must fit the context budget; checked before any
        // credit is held.
        if let Err(err) = self.assembler.assemble(query, &[]) {
            self.to_terminal(&mut request, RequestState::Rejected);
            return Err(EngineError::InvalidQuery(err.to_string()));
        }

        // ── Reserve ──────────────────────────────────────────────────
        // The prompt can never exceed the assembler budget, so pricing
        // the full budget plus the output allowance over-reserves;
        // settlement refunds the difference.
        let estimate = self
            .cost_model
            .estimate(self.assembler.budget() as u32, max_output);
        let reservation = match self.quota.reserve(&request_account, estimate) {
            Ok(r) => r,
            Err(err) => {
                self.to_terminal(&mut request, RequestState::Rejected);
                return Err(err.into());
            }
        };
        let mut guard = ReservationGuard::new(self.quota.clone(), reservation.id);
        self.advance(&mut request, RequestState::Reserved)?;

        // ── Retrieve ─────────────────────────────────────────────────
        let chunks = match self.retrieve(query, top_k).await {
            Ok(chunks) => chunks,
            Err(err) => {
                self.to_terminal(&mut request, RequestState::RetrievalFailed);
                return Err(err.into());
            }
        };
        request.chunk_ids = chunks.iter().map(|c| c.chunk.id.clone()).collect();
        self.advance(&mut request, RequestState::Retrieved)?;

        // ── Assemble + generate ──────────────────────────────────────
        let prompt = self
            .assembler
            .assemble(query, &chunks)
            .map_err(|e| EngineError::Internal(format!("assembly failed post-reserve: {e}")))?;
        if !prompt.has_context() && !chunks.is_empty() {
            debug!(request = %request.id, "no retrieved chunk fit the budget, query-only prompt");
        }

        let completion = match self
            .generation
            .complete_capped(Some(prompt.system.clone()), prompt.user.clone(), max_output)
            .await
        {
            Ok(c) => c,
            Err(err) => {
                self.to_terminal(&mut request, RequestState::GenerationFailed);
                return Err(err.into());
            }
        };
        request.input_tokens = prompt.estimated_tokens as u32;
        request.output_tokens = completion.output_tokens as u32;
        self.advance(&mut request, RequestState::Generated)?;

        // ── Settle ───────────────────────────────────────────────────
        let cost = self
            .cost_model
            .cost(request.input_tokens, request.output_tokens);
        let reservation_id = guard
            .disarm()
            .ok_or_else(|| EngineError::Internal("reservation already consumed".into()))?;
        let settlement = self.quota.settle(&reservation_id, cost)?;
        request.cost = cost;
        self.advance(&mut request, RequestState::Settled)?;

        // ── Record ───────────────────────────────────────────────────
        // The account was already charged and the caller has an answer;
        // a ledger fault must not turn this into a failed request.
        if let Err(err) = self
            .ledger
            .record(
                &request.id,
                request_account.clone(),
                request.input_tokens,
                request.output_tokens,
                cost,
            )
            .await
        {
            error!(request = %request.id, error = %err, "usage recording failed after settlement");
        }

        let balance_remaining = self
            .quota
            .snapshot(&request_account)
            .map(|s| s.available)
            .unwrap_or(0);

        info!(
            request = %request.id,
            cost,
            refunded = settlement.refunded,
            attempts = completion.attempts,
            "query settled"
        );

        Ok(QueryOutcome {
            request,
            answer: completion.text,
            model: completion.model,
            refunded: settlement.refunded,
            balance_remaining,
        })
    }

    /// Embed the query and search the index, both under the retrieval
    /// deadline. An embedding failure is a retrieval outage: answering
    /// without context would silently change answer semantics.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let timeout_ms = self.retrieval_timeout.as_millis() as u64;

        let embedding = tokio::time::timeout(
            self.retrieval_timeout,
            self.generation.embed(vec![query.to_string()]),
        )
        .await
        .map_err(|_| RetrievalError::Timeout { timeout_ms })?
        .map_err(|e| RetrievalError::Unavailable(format!("query embedding failed: {e}")))?
        .into_iter()
        .next()
        .ok_or_else(|| RetrievalError::Unavailable("empty embedding response".into()))?;

        tokio::time::timeout(
            self.retrieval_timeout,
            self.retriever.search(&embedding, top_k),
        )
        .await
        .map_err(|_| RetrievalError::Timeout { timeout_ms })?
    }

    // ── Document management ──────────────────────────────────────────

    /// Chunk, embed, and (re-)index one document.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestOutcome, EngineError> {
        let pieces = chunker::split_into_chunks(text, DEFAULT_CHUNK_CHARS);
        if pieces.is_empty() {
            return Err(EngineError::InvalidDocument(
                "document has no content".into(),
            ));
        }

        let embeddings = self.generation.embed(pieces.clone()).await?;
        if embeddings.len() != pieces.len() {
            return Err(EngineError::Internal(format!(
                "embedding count mismatch: {} texts, {} vectors",
                pieces.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (content, embedding))| Chunk::new(document_id, i, content, embedding))
            .collect();

        let count = chunks.len();
        let version = self.index.index_document(document_id, chunks);
        Ok(IngestOutcome {
            chunks: count,
            index_version: version,
        })
    }

    /// Drop a document from the index. Returns how many chunks went.
    pub fn remove_document(&self, document_id: &str) -> usize {
        self.index.remove_document(document_id)
    }

    // ── State machine helpers ────────────────────────────────────────

    fn advance(
        &self,
        request: &mut QueryRequest,
        next: RequestState,
    ) -> Result<(), EngineError> {
        request
            .transition(next)
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    /// Best-effort transition into a failure exit; an illegal combination
    /// here is a bug worth a log line, not a second error.
    fn to_terminal(&self, request: &mut QueryRequest, state: RequestState) {
        if let Err(err) = request.transition(state) {
            error!(request = %request.id, error = %err, "illegal terminal transition");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
