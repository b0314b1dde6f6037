//! The v1 REST API.
//!
//! Routes:
//! - `POST /v1/query`           — run a metered retrieval-augmented query
//! - `GET  /v1/usage`           — balance and metered totals for the caller
//! - `POST /v1/documents`       — ingest a document into the index
//! - `DELETE /v1/documents/{id}` — drop a document from the index
//!
//! All routes sit behind the bearer-token middleware in `lib.rs`; the
//! resolved claims arrive via request extensions. Document routes are
//! additionally tier-gated.

use axum::{
    Extension, Router,
    extract::{Path, State},
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tollgate_auth::Claims;
use tollgate_core::RequestState;
use tracing::info;

use tollgate_engine::QueryOptions;

use crate::SharedState;
use crate::error::ApiError;

/// Build the `/v1` route tree. Auth is layered on by the caller.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/usage", get(usage_handler))
        .route("/documents", post(ingest_handler))
        .route("/documents/{id}", delete(remove_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct QueryApiRequest {
    pub query: String,
    /// Per-request output cap; clamped to the configured maximum.
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// How many chunks to retrieve for context.
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct QueryApiResponse {
    pub query_id: String,
    pub state: RequestState,
    pub answer: String,
    pub model: String,
    /// Chunk ids that backed the answer, in similarity order.
    pub chunks: Vec<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: u64,
    pub refunded: u64,
    pub balance_remaining: u64,
}

#[derive(Serialize, Deserialize)]
pub struct UsageResponse {
    pub account_id: String,
    pub tier: String,
    pub active: bool,
    pub available: u64,
    pub lifetime_granted: u64,
    /// Accumulated uncovered overdraw, if any.
    pub deficit: u64,
    pub queries: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub credits_spent: u64,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    /// Stable id for later removal. Generated when absent.
    #[serde(default)]
    pub document_id: Option<String>,
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct IngestResponse {
    pub document_id: String,
    pub chunks: usize,
    pub index_version: u64,
}

#[derive(Serialize, Deserialize)]
pub struct RemoveResponse {
    pub document_id: String,
    pub chunks_removed: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn query_handler(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<QueryApiRequest>,
) -> Result<Json<QueryApiResponse>, ApiError> {
    let options = QueryOptions {
        max_output_tokens: payload.max_output_tokens,
        top_k: payload.top_k,
    };
    let outcome = state
        .engine
        .execute_with(claims.account_id.clone(), &payload.query, options)
        .await?;

    Ok(Json(QueryApiResponse {
        query_id: outcome.request.id,
        state: outcome.request.state,
        answer: outcome.answer,
        model: outcome.model,
        chunks: outcome
            .request
            .chunk_ids
            .iter()
            .map(|id| id.to_string())
            .collect(),
        input_tokens: outcome.request.input_tokens,
        output_tokens: outcome.request.output_tokens,
        cost: outcome.request.cost,
        refunded: outcome.refunded,
        balance_remaining: outcome.balance_remaining,
    }))
}

async fn usage_handler(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UsageResponse>, ApiError> {
    let snapshot = state.engine.quota().snapshot(&claims.account_id)?;
    let totals = state
        .engine
        .ledger()
        .totals(&claims.account_id)
        .await
        .map_err(tollgate_engine::EngineError::from)?;

    Ok(Json(UsageResponse {
        account_id: snapshot.account_id.to_string(),
        tier: snapshot.tier.to_string(),
        active: snapshot.active,
        available: snapshot.available,
        lifetime_granted: snapshot.lifetime_granted,
        deficit: snapshot.deficit,
        queries: totals.record_count,
        input_tokens: totals.input_tokens,
        output_tokens: totals.output_tokens,
        credits_spent: totals.credits,
    }))
}

async fn ingest_handler(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if !claims.tier.can_manage_documents() {
        return Err(ApiError::Forbidden);
    }

    let document_id = payload
        .document_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = state.engine.ingest_document(&document_id, &payload.text).await?;
    info!(
        account = %claims.account_id,
        document = %document_id,
        chunks = outcome.chunks,
        "document ingested"
    );

    Ok(Json(IngestResponse {
        document_id,
        chunks: outcome.chunks,
        index_version: outcome.index_version,
    }))
}

async fn remove_handler(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RemoveResponse>, ApiError> {
    if !claims.tier.can_manage_documents() {
        return Err(ApiError::Forbidden);
    }

    let chunks_removed = state.engine.remove_document(&id);
    info!(
        account = %claims.account_id,
        document = %id,
        chunks_removed,
        "document removed"
    );

    Ok(Json(RemoveResponse {
        document_id: id,
        chunks_removed,
    }))
}
