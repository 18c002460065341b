//! Server configuration.
//!
//! Layered load order: built-in defaults, then the YAML file (if given),
//! then environment variables prefixed `MODELHUB__` (double underscore as
//! the section separator), then CLI overrides.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use hub_gateway::GatewayConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub hub: HubConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    pub bind_addr: String,
    /// Control-plane protection applied to `/v1/admin` routes.
    pub admin_rate_limit: AdminRateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            admin_rate_limit: AdminRateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminRateLimitConfig {
    pub rps: u32,
    pub burst: u32,
}

impl Default for AdminRateLimitConfig {
    fn default() -> Self {
        Self { rps: 20, burst: 40 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    /// Gateway endpoint written into issued connections.
    pub gateway_target: String,
    /// Default platform scope for tenants that do not declare one.
    pub default_scope: String,
    /// Base URL the stand-in provisioner derives endpoints from, for model
    /// entries without an explicit `endpoint_url`.
    pub provisioner_base_url: String,
    /// Models to register at startup.
    pub models: Vec<ModelConfig>,
    /// Spokes to onboard at startup.
    pub tenants: Vec<TenantConfig>,
    /// Hub-held backend credentials, keyed by backend id. Values land in
    /// memory as secrets and never appear in logs.
    pub backend_credentials: HashMap<String, String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            gateway_target: "http://127.0.0.1:8080/v1".into(),
            default_scope: "modelhub/default".into(),
            provisioner_base_url: "https://backends.local".into(),
            models: Vec::new(),
            tenants: Vec::new(),
            backend_credentials: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub name: String,
    pub format: String,
    pub version: String,
    /// Placement restriction; deployments outside it fail registration.
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    /// Region the backend capacity lives in.
    pub region: String,
    pub capacity_units: u32,
    /// Explicit backend endpoint; omitted entries go through the
    /// provisioning port instead.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Backend id; derived from model and region when omitted.
    #[serde(default)]
    pub backend_id: Option<String>,
    /// Per-model quota override for the rule's rate-limit step.
    #[serde(default)]
    pub rate_limit: Option<ModelRateLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRateLimitConfig {
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    pub display_name: String,
    /// Platform scope; `hub.default_scope` applies when omitted.
    #[serde(default)]
    pub scope: Option<String>,
    /// Tenant's declared name within the scope.
    pub name: String,
    pub models: Vec<String>,
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// # Errors
    /// Fails on unreadable files, unknown keys, or type mismatches.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("MODELHUB__").split("__"))
            .extract()
            .context("invalid configuration")
    }

    /// Apply CLI overrides on top of the loaded configuration.
    pub fn apply_port_override(&mut self, port: Option<u16>) {
        if let Some(port) = port {
            let host = self
                .server
                .bind_addr
                .rsplit_once(':')
                .map_or("127.0.0.1", |(host, _)| host);
            self.server.bind_addr = format!("{host}:{port}");
        }
    }
}
