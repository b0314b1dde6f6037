//! HTTP API gateway for Tollgate.
//!
//! Exposes the health check and the v1 API: metered query execution,
//! usage reporting, and document management.
//!
//! Built on Axum. Every /v1 route sits behind bearer-token
//! authentication; the security layers (body limit, CORS, trace
//! logging) are applied once at the top of the router.

pub mod api_v1;
pub mod error;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use tollgate_auth::Authenticator;
use tollgate_engine::Engine;

use crate::error::ApiError;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<Engine>,
    pub auth: Arc<Authenticator>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: health plus the authenticated v1 API.
///
/// Security layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to GET/POST/DELETE with content-type and auth headers
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server on the configured address.
pub async fn serve(
    host: &str,
    port: u16,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let app = build_router(state);

    info!(addr = %addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Authentication middleware for the /v1 API.
///
/// Resolves `Authorization: Bearer <token>` to claims and stashes them
/// in the request extensions for handlers. Any failure is the same
/// opaque 401.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.auth.authenticate(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
