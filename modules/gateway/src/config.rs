//! Gateway configuration.

use hub_sdk::PolicyStep;
use serde::{Deserialize, Serialize};

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    // === Timeout Defaults ===
    /// Bounded dispatch timeout in milliseconds.
    pub default_request_timeout_ms: u64,

    // === Rate Limiting ===
    /// Per-connection quota applied when a rule carries no explicit
    /// rate-limit step. Fixed window.
    pub rate_limit_requests: u32,
    /// Window length for the default quota, in seconds.
    pub rate_limit_window_secs: u64,

    // === Default Parameter Injection ===
    /// Name of the versioning query parameter backends require.
    pub default_api_version_param: String,
    /// Value injected when the caller omitted the parameter. A value the
    /// caller supplied explicitly is never changed.
    pub default_api_version: String,
}

impl GatewayConfig {
    /// The pipeline applied to rules registered without explicit policy:
    /// version-parameter injection, credential substitution, then the
    /// default per-connection quota.
    #[must_use]
    pub fn default_policy(&self) -> Vec<PolicyStep> {
        vec![
            PolicyStep::InjectDefaultParam {
                name: self.default_api_version_param.clone(),
                value: self.default_api_version.clone(),
            },
            PolicyStep::SubstituteCredential,
            PolicyStep::RateLimit {
                limit: self.rate_limit_requests,
                window_secs: self.rate_limit_window_secs,
            },
        ]
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: 30_000,

            rate_limit_requests: 100,
            rate_limit_window_secs: 60,

            default_api_version_param: "api-version".into(),
            default_api_version: "2024-10-21".into(),
        }
    }
}
