//! Port traits the gateway hot path is wired through.
//!
//! The router never touches a concrete store: the broker implements
//! [`ConnectionAuthenticator`], the registry implements [`ModelResolver`],
//! and the composition root supplies [`BackendCredentialSource`] and
//! [`BackendDispatcher`]. Tests substitute any of them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;

use crate::error::HubError;
use crate::models::{ConnectionScope, InvokeResponse, ModelName, RoutingRule};

/// Resolves a presented credential to the connection it authenticates.
#[async_trait]
pub trait ConnectionAuthenticator: Send + Sync {
    /// Look up the connection owning `presented`.
    ///
    /// # Errors
    /// `Unauthenticated` when no live connection matches (unknown or
    /// revoked material both look the same to the caller).
    async fn authenticate(&self, presented: &str) -> Result<ConnectionScope, HubError>;
}

/// Resolves a logical model name to its active routing rule.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Resolve `name` against one consistent registry snapshot.
    ///
    /// # Errors
    /// `BackendUnavailable` when no active rule routes the model.
    async fn resolve(&self, name: &ModelName) -> Result<RoutingRule, HubError>;
}

/// Supplies the hub-held credential for a backend.
///
/// Tenants never see these values; the router attaches them after stripping
/// whatever credential the caller sent.
#[async_trait]
pub trait BackendCredentialSource: Send + Sync {
    /// # Errors
    /// `BackendUnavailable` when no credential is held for the rule's
    /// backend.
    async fn credential_for(&self, rule: &RoutingRule) -> Result<SecretString, HubError>;
}

/// Fully-prepared outbound request, after the policy pipeline ran.
#[derive(Debug)]
pub struct BackendRequest {
    /// Headers to forward (caller credential headers already stripped).
    pub headers: HashMap<String, String>,
    /// Query parameters, defaults already injected.
    pub query: HashMap<String, String>,
    /// Body, unmodified from the caller.
    pub body: Bytes,
    /// Backend credential to attach as a bearer token.
    pub credential: SecretString,
    /// Bounded dispatch timeout.
    pub timeout: Duration,
}

/// Forwards a prepared request to a physical deployment.
#[async_trait]
pub trait BackendDispatcher: Send + Sync {
    /// # Errors
    /// `BackendError` on upstream 5xx (status preserved) or when the
    /// timeout fires. No retry happens here; retries are a client concern.
    async fn dispatch(
        &self,
        rule: &RoutingRule,
        request: BackendRequest,
    ) -> Result<InvokeResponse, HubError>;
}
