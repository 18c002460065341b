//! ModelHub error taxonomy.
//!
//! Transport-agnostic error definitions shared by every module. Callers and
//! tests branch on the variant, never on message text.

use thiserror::Error;

use crate::models::ConnectionId;

/// Error type for hub operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Bad, missing, or revoked connection credential.
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The connection's allow-list does not cover the requested model.
    #[error("model not allowed for this connection: {model}")]
    ModelNotAllowed { model: String },

    /// The registry has no entry for the model.
    #[error("unknown model: {model}")]
    UnknownModel { model: String },

    /// A registry entry exists (or existed) but resolves to nothing live.
    #[error("no live backend for model: {model}")]
    BackendUnavailable { model: String },

    /// Registration violated a placement rule (e.g. region pinning).
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Quota exceeded; recoverable after the stated interval.
    #[error("rate limit exceeded, retry after {retry_after_sec}s")]
    RateLimited { retry_after_sec: u64 },

    /// Upstream failure. `upstream_status` is preserved when the backend
    /// responded at all; `None` means the bounded dispatch timeout fired or
    /// the connection failed before a status line.
    #[error("backend error (upstream status {upstream_status:?})")]
    BackendError {
        upstream_status: Option<u16>,
        retry_after_sec: Option<u64>,
    },

    /// Policy enforcer denial.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// No connection with the given identity.
    #[error("connection not found: {id}")]
    ConnectionNotFound { id: ConnectionId },

    /// Invariant breakage that is not the caller's fault.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl HubError {
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn model_not_allowed(model: impl Into<String>) -> Self {
        Self::ModelNotAllowed {
            model: model.into(),
        }
    }

    #[must_use]
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    #[must_use]
    pub fn backend_unavailable(model: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            model: model.into(),
        }
    }

    #[must_use]
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rate_limited(retry_after_sec: u64) -> Self {
        Self::RateLimited { retry_after_sec }
    }

    #[must_use]
    pub fn backend_error(upstream_status: Option<u16>, retry_after_sec: Option<u64>) -> Self {
        Self::BackendError {
            upstream_status,
            retry_after_sec,
        }
    }

    #[must_use]
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a caller may reasonably retry with backoff.
    ///
    /// Validation and authorization failures are excluded: they indicate a
    /// caller or configuration mistake and retrying cannot fix them.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::BackendError { .. })
    }

    /// Retry-after hint in seconds, when one applies.
    #[must_use]
    pub fn retry_after_sec(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_sec } => Some(*retry_after_sec),
            Self::BackendError {
                retry_after_sec, ..
            } => *retry_after_sec,
            _ => None,
        }
    }

    /// The HTTP-equivalent status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated { .. } => 401,
            Self::ModelNotAllowed { .. } | Self::Unauthorized { .. } => 403,
            Self::UnknownModel { .. } | Self::ConstraintViolation { .. } => 400,
            Self::BackendUnavailable { .. } => 503,
            Self::RateLimited { .. } => 429,
            Self::BackendError {
                upstream_status, ..
            } => {
                if upstream_status.is_some() {
                    502
                } else {
                    504
                }
            }
            Self::ConnectionNotFound { .. } => 404,
            Self::Internal { .. } => 500,
        }
    }

    /// Stable machine-readable code for wire responses and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "HUB_UNAUTHENTICATED",
            Self::ModelNotAllowed { .. } => "HUB_MODEL_NOT_ALLOWED",
            Self::UnknownModel { .. } => "HUB_UNKNOWN_MODEL",
            Self::BackendUnavailable { .. } => "HUB_BACKEND_UNAVAILABLE",
            Self::ConstraintViolation { .. } => "HUB_CONSTRAINT_VIOLATION",
            Self::RateLimited { .. } => "HUB_RATE_LIMITED",
            Self::BackendError { .. } => "HUB_BACKEND_ERROR",
            Self::Unauthorized { .. } => "HUB_UNAUTHORIZED",
            Self::ConnectionNotFound { .. } => "HUB_CONNECTION_NOT_FOUND",
            Self::Internal { .. } => "HUB_INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classes() {
        assert!(HubError::rate_limited(30).is_retriable());
        assert!(HubError::backend_error(Some(503), None).is_retriable());
        assert!(!HubError::unknown_model("m").is_retriable());
        assert!(!HubError::unauthenticated("revoked").is_retriable());
        assert!(!HubError::unauthorized("no grant").is_retriable());
    }

    #[test]
    fn retry_after_hints() {
        assert_eq!(HubError::rate_limited(12).retry_after_sec(), Some(12));
        assert_eq!(
            HubError::backend_error(Some(503), Some(5)).retry_after_sec(),
            Some(5)
        );
        assert_eq!(HubError::unauthenticated("x").retry_after_sec(), None);
    }

    #[test]
    fn status_codes() {
        assert_eq!(HubError::unauthenticated("x").status_code(), 401);
        assert_eq!(HubError::model_not_allowed("m").status_code(), 403);
        assert_eq!(HubError::unknown_model("m").status_code(), 400);
        assert_eq!(HubError::backend_unavailable("m").status_code(), 503);
        assert_eq!(HubError::rate_limited(1).status_code(), 429);
        assert_eq!(HubError::backend_error(Some(500), None).status_code(), 502);
        assert_eq!(HubError::backend_error(None, None).status_code(), 504);
        assert_eq!(HubError::unauthorized("x").status_code(), 403);
    }
}
