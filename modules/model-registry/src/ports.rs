//! Output ports for the registry.

use async_trait::async_trait;
use uuid::Uuid;

use hub_sdk::{HubError, ModelFormat, ModelName, PhysicalDeployment, Principal, Region};

/// Declarative description of the capacity to provision for a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    pub model_name: ModelName,
    pub format: ModelFormat,
    pub region: Region,
    pub capacity_units: u32,
}

/// Result of provisioning: a live endpoint plus the managed identity the
/// engine assigned to the backend.
#[derive(Debug, Clone)]
pub struct ProvisionedBackend {
    pub deployment: PhysicalDeployment,
    /// Managed service identity the backend runs as. Grants against hub
    /// resources (e.g. `invoke-own-resources`) target this.
    pub managed_identity: Principal,
}

/// Boundary to the external provisioning engine.
///
/// The engine owns reconciliation: callers hand it a declarative spec and
/// poll until the backend is ready. This port models that as a single async
/// call that returns once provisioning completed; retry and backoff policy
/// belong to the engine's own contract, not to the hub.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// # Errors
    /// `Internal` when the engine reports a terminal failure.
    async fn provision(&self, spec: DeploymentSpec) -> Result<ProvisionedBackend, HubError>;
}

/// In-memory stand-in for the provisioning engine.
///
/// Derives a stable endpoint URL from the spec and mints a fresh managed
/// identity per backend. Backs tests and config entries that omit an
/// explicit endpoint.
#[derive(Debug, Clone)]
pub struct StaticProvisioner {
    base_url: String,
}

impl StaticProvisioner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProvisioningEngine for StaticProvisioner {
    async fn provision(&self, spec: DeploymentSpec) -> Result<ProvisionedBackend, HubError> {
        let backend_id = format!("{}-{}", spec.model_name, spec.region);
        let endpoint_url = format!(
            "{}/{}/deployments/{}",
            self.base_url.trim_end_matches('/'),
            spec.region,
            spec.model_name
        );

        tracing::debug!(
            backend = %backend_id,
            region = %spec.region,
            capacity = spec.capacity_units,
            "Provisioned static backend"
        );

        Ok(ProvisionedBackend {
            deployment: PhysicalDeployment {
                backend_id: hub_sdk::BackendId::new(backend_id),
                region: spec.region,
                capacity_units: spec.capacity_units,
                endpoint_url,
            },
            managed_identity: Principal::service_identity(Uuid::new_v4()),
        })
    }
}
