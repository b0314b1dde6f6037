//! HTTP error mapping.
//!
//! Every pipeline failure class has one status code:
//! authentication failures are an opaque 401, an empty balance is 402,
//! retrieval outages are 503, backend failures are 502, and anything
//! the caller can fix is 400. Internal detail never leaks into bodies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tollgate_core::{AuthError, QuotaError};
use tollgate_engine::EngineError;
use tracing::{error, warn};

/// Wire shape for all error bodies.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A request failure, ready to render as an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Credential missing, malformed, expired, or forged. Always the
    /// same body, so the endpoint is useless as a validity oracle.
    Unauthorized,
    /// Authenticated but not allowed on this surface.
    Forbidden,
    /// A pipeline failure, mapped by class.
    Engine(EngineError),
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        ApiError::Unauthorized
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        ApiError::Engine(EngineError::Quota(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            ApiError::Engine(err) => map_engine_error(err),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn map_engine_error(err: EngineError) -> (StatusCode, String) {
    match err {
        EngineError::InvalidQuery(msg) | EngineError::InvalidDocument(msg) => {
            (StatusCode::BAD_REQUEST, msg)
        }
        EngineError::Quota(quota) => match quota {
            QuotaError::InsufficientCredit { .. } => {
                (StatusCode::PAYMENT_REQUIRED, quota.to_string())
            }
            // A valid token for an account the store does not know, or
            // one that has been deactivated. Same opaque answer as a bad
            // credential.
            QuotaError::UnknownAccount(_) | QuotaError::AccountInactive(_) => {
                warn!(error = %quota, "query from unserviceable account");
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
            other => {
                error!(error = %other, "quota bookkeeping failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        },
        EngineError::Retrieval(err) => {
            warn!(error = %err, "retrieval unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "retrieval unavailable".to_string())
        }
        EngineError::Generation(err) => {
            warn!(error = %err, "generation failed");
            (StatusCode::BAD_GATEWAY, "generation failed".to_string())
        }
        EngineError::Ledger(err) => {
            error!(error = %err, "ledger failure surfaced to API");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
        EngineError::Internal(msg) => {
            error!(error = %msg, "internal failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}
