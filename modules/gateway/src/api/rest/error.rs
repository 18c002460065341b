//! REST error mapping.
//!
//! Every `HubError` maps to a problem-style JSON body with a stable code,
//! so callers branch on `code` (or the status), never on message text.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{StatusCode, header};
use serde::Serialize;

use hub_sdk::HubError;

/// Problem document returned for every failed request.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// Stable machine-readable code, e.g. `HUB_RATE_LIMITED`.
    pub code: &'static str,
    /// Short human-readable summary.
    pub title: &'static str,
    /// Specific detail for this occurrence.
    pub detail: String,
    /// HTTP status, mirrored into the body for log pipelines.
    pub status: u16,
}

impl From<&HubError> for Problem {
    fn from(e: &HubError) -> Self {
        let title = match e {
            HubError::Unauthenticated { .. } => "Unauthenticated",
            HubError::ModelNotAllowed { .. } => "Model not allowed",
            HubError::UnknownModel { .. } => "Unknown model",
            HubError::BackendUnavailable { .. } => "Backend unavailable",
            HubError::ConstraintViolation { .. } => "Constraint violation",
            HubError::RateLimited { .. } => "Rate limit exceeded",
            HubError::BackendError { .. } => "Backend error",
            HubError::Unauthorized { .. } => "Unauthorized",
            HubError::ConnectionNotFound { .. } => "Connection not found",
            HubError::Internal { .. } => "Internal error",
        };

        Self {
            code: e.code(),
            title,
            detail: e.to_string(),
            status: e.status_code(),
        }
    }
}

/// Axum-facing error wrapper; converts through `?` from `HubError`.
#[derive(Debug)]
pub struct ApiError {
    problem: Problem,
    retry_after_sec: Option<u64>,
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        Self {
            problem: Problem::from(&e),
            retry_after_sec: e.retry_after_sec(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.problem.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(self.problem)).into_response();
        if let Some(secs) = self.retry_after_sec {
            if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
