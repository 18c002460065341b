//! Domain service for the gateway.
//!
//! This service orchestrates the request pipeline: authenticate, authorize,
//! resolve, policy steps, dispatch. It owns no transport concerns and talks
//! to the rest of the hub exclusively through ports, so every stage is
//! testable in isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::instrument;

use access_policy::PolicyEnforcer;
use hub_sdk::{
    BackendCredentialSource, BackendDispatcher, BackendRequest, Capability,
    ConnectionAuthenticator, HubError, InvokeRequest, InvokeResponse, ModelName, ModelResolver,
    PolicyStep, Principal, ResourceScope, RoutingRule,
};

use crate::config::GatewayConfig;
use crate::domain::rate_limit::{Clock, FixedWindowLimiter, SystemClock};

/// Header names a caller might use to smuggle its own backend credential.
/// All of them are stripped before dispatch, unconditionally.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "api-key", "x-api-key"];

/// Service configuration extracted from gateway config.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bounded dispatch timeout.
    pub request_timeout: Duration,
    /// Default per-connection quota when a rule has no rate-limit step.
    pub default_rate_limit: u32,
    /// Window for the default quota, in seconds.
    pub default_rate_window_secs: u64,
}

impl From<&GatewayConfig> for ServiceConfig {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(cfg.default_request_timeout_ms),
            default_rate_limit: cfg.rate_limit_requests,
            default_rate_window_secs: cfg.rate_limit_window_secs,
        }
    }
}

/// The request-time router.
///
/// Rules carry their policy steps in execution order; two invariants hold
/// regardless of what a rule declares:
/// - caller-supplied backend credentials never reach a backend (stripping
///   is unconditional, and a hub credential is exchanged even when the rule
///   omits an explicit substitution step), and
/// - every connection runs under some quota (the configured default applies
///   when the rule has no rate-limit step).
pub struct GatewayService {
    authenticator: Arc<dyn ConnectionAuthenticator>,
    resolver: Arc<dyn ModelResolver>,
    credentials: Arc<dyn BackendCredentialSource>,
    dispatcher: Arc<dyn BackendDispatcher>,
    policy: Arc<PolicyEnforcer>,
    /// The gateway's own service identity, checked against backend scopes
    /// during credential exchange.
    identity: Principal,
    limiter: FixedWindowLimiter,
    config: ServiceConfig,
}

impl GatewayService {
    /// Create a new service instance on the system clock.
    pub fn new(
        authenticator: Arc<dyn ConnectionAuthenticator>,
        resolver: Arc<dyn ModelResolver>,
        credentials: Arc<dyn BackendCredentialSource>,
        dispatcher: Arc<dyn BackendDispatcher>,
        policy: Arc<PolicyEnforcer>,
        identity: Principal,
        config: ServiceConfig,
    ) -> Self {
        Self::with_clock(
            authenticator,
            resolver,
            credentials,
            dispatcher,
            policy,
            identity,
            config,
            Arc::new(SystemClock),
        )
    }

    /// Create a service on an explicit clock (tests step windows manually).
    #[allow(clippy::too_many_arguments)]
    pub fn with_clock(
        authenticator: Arc<dyn ConnectionAuthenticator>,
        resolver: Arc<dyn ModelResolver>,
        credentials: Arc<dyn BackendCredentialSource>,
        dispatcher: Arc<dyn BackendDispatcher>,
        policy: Arc<PolicyEnforcer>,
        identity: Principal,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            authenticator,
            resolver,
            credentials,
            dispatcher,
            policy,
            identity,
            limiter: FixedWindowLimiter::new(clock),
            config,
        }
    }

    /// Route one inbound request.
    ///
    /// # Errors
    /// One of the taxonomy kinds, in pipeline order: `Unauthenticated`,
    /// `ModelNotAllowed`, `BackendUnavailable`, `Unauthorized`,
    /// `RateLimited`, `BackendError`.
    #[instrument(skip(self, presented, request), fields(model = %model))]
    pub async fn invoke(
        &self,
        presented: &str,
        model: &ModelName,
        request: InvokeRequest,
    ) -> Result<InvokeResponse, HubError> {
        let start = std::time::Instant::now();

        // Step 1: Authenticate
        let scope = self.authenticator.authenticate(presented).await?;

        // Step 2: Authorize against the connection allow-list
        if !scope.allows(model) {
            return Err(HubError::model_not_allowed(model.as_str()));
        }

        // Step 3: Resolve one registry snapshot. The registry is
        // authoritative: an allow-listed model with no live rule fails here.
        let rule = self.resolver.resolve(model).await?;

        // Steps 4-6: policy pipeline, in rule order
        let InvokeRequest {
            mut headers,
            mut query,
            body,
        } = request;
        strip_credential_headers(&mut headers);

        let mut credential: Option<SecretString> = None;
        let mut quota_applied = false;
        for step in &rule.policy {
            match step {
                PolicyStep::InjectDefaultParam { name, value } => {
                    // Only fill the gap; an explicit caller value stays.
                    query
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
                PolicyStep::SubstituteCredential => {
                    credential = Some(self.exchange_credential(&rule).await?);
                }
                PolicyStep::RateLimit { limit, window_secs } => {
                    quota_applied = true;
                    self.limiter.check(scope.id, *limit, *window_secs)?;
                }
            }
        }

        if !quota_applied {
            self.limiter.check(
                scope.id,
                self.config.default_rate_limit,
                self.config.default_rate_window_secs,
            )?;
        }

        let credential = match credential {
            Some(credential) => credential,
            None => self.exchange_credential(&rule).await?,
        };

        // Step 7: Dispatch with a bounded timeout. No retry here.
        let response = self
            .dispatcher
            .dispatch(
                &rule,
                BackendRequest {
                    headers,
                    query,
                    body,
                    credential,
                    timeout: self.config.request_timeout,
                },
            )
            .await?;

        // Duration in ms is always small enough for u64 in practice
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            duration_ms,
            status_code = response.status_code,
            connection = %scope.id,
            backend = %response.backend_id,
            "Invocation completed"
        );

        Ok(response)
    }

    /// Step 5 core: capability exchange, then the hub-held credential.
    ///
    /// The gateway's identity must hold `invoke-model` on the backend's
    /// scope; tenants never hold backend credentials themselves.
    async fn exchange_credential(&self, rule: &RoutingRule) -> Result<SecretString, HubError> {
        let backend_scope = ResourceScope::backend(&rule.backend.backend_id);
        if !self
            .policy
            .check(&self.identity, &backend_scope, Capability::InvokeModel)
        {
            return Err(HubError::unauthorized(format!(
                "gateway identity lacks invoke-model on {backend_scope}"
            )));
        }
        self.credentials.credential_for(rule).await
    }
}

fn strip_credential_headers(headers: &mut HashMap<String, String>) {
    headers.retain(|name, _| {
        !CREDENTIAL_HEADERS
            .iter()
            .any(|denied| name.eq_ignore_ascii_case(denied))
    });
}
