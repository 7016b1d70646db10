#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-service** – HTTP boundary for the AI4All coordinator.
//!
//! Translates authenticated JSON requests into core coordinator operations
//! and maps the coordinator's error taxonomy onto HTTP statuses. Worker
//! endpoints verify a signature over `AI4ALL:v1:{accountId}:{timestamp}`
//! against the account's registered public key; admin endpoints require the
//! shared `X-Admin-Key` header. Transport concerns stop here — the kernel
//! never sees HTTP.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use ai4a_auth::{AuthError, RequestAuthenticator, SignatureScheme};
use ai4a_kernel::{CoordinatorError, DayCoordinator};

pub mod dto;
mod handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct ServiceState {
    /// The lifecycle state machine.
    pub coordinator: Arc<DayCoordinator>,
    /// Signed-request verifier over the configured signature scheme.
    pub authenticator: Arc<RequestAuthenticator<Arc<dyn SignatureScheme>>>,
    /// Shared admin credential for `/admin/*`.
    pub admin_key: String,
}

/// Build the full coordinator router.
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/nodes/register", post(handlers::register))
        .route("/nodes/heartbeat", post(handlers::heartbeat))
        .route("/admin/day/start", post(handlers::day_start))
        .route("/admin/day/status", get(handlers::day_status))
        .route("/admin/day/finalize", post(handlers::day_finalize))
        .route("/work/request", post(handlers::work_request))
        .route("/work/submit", post(handlers::work_submit))
        .route("/rewards/day", get(handlers::rewards_day))
        .route("/rewards/root", get(handlers::rewards_root))
        .route("/rewards/proof", get(handlers::rewards_proof))
        .route("/accounts/leaderboard", get(handlers::leaderboard))
        .route("/accounts/supply", get(handlers::supply))
        .route("/accounts/:id/balance", get(handlers::balance))
        .route("/accounts/:id/history", get(handlers::history))
        .route("/accounts/:id/devices", get(handlers::devices))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
}

//─────────────────────────────
//  Error mapping
//─────────────────────────────

/// Boundary error: an HTTP status plus a machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    /// 400 with a free-form message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION".to_string(),
            message: message.into(),
        }
    }

    /// 401 with a free-form message.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    /// 403 for a bad admin credential.
    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".to_string(),
            message: "admin key required".to_string(),
        }
    }

    /// 404 with a free-form message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::Validation(message) => ApiError::validation(message),
            CoordinatorError::StateConflict(kind) => ApiError {
                status: StatusCode::CONFLICT,
                code: kind.to_string(),
                message: kind.to_string(),
            },
            CoordinatorError::NotFound(what) => ApiError::not_found(what),
            CoordinatorError::Internal(e) => {
                tracing::error!(error = %e, "internal coordinator failure");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "INTERNAL".to_string(),
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::BadTimestamp(_) | AuthError::BadKey => ApiError::validation(e.to_string()),
            AuthError::StaleTimestamp
            | AuthError::AddressMismatch(_)
            | AuthError::BadSignature
            | AuthError::UnknownAccount(_) => ApiError::unauthorized(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        CoordinatorError::Internal(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = dto::ErrorBody {
            error: dto::ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
