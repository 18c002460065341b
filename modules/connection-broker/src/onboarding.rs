//! Tenant onboarding factory.
//!
//! One parameterized path drives every spoke attachment: allocate a name
//! from the tenant's context, then issue the scoped connection. Feeding it a
//! sequence of tenant specs replaces per-spoke copy-pasted wiring.

use std::sync::Arc;

use tracing::instrument;

use hub_naming::{TenantContext, allocate, resource_name};
use hub_sdk::{Connection, HubError, ModelName, Tenant, TenantId};

use crate::broker::ConnectionBroker;

/// Declarative description of one spoke to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantSpec {
    pub display_name: String,
    pub context: TenantContext,
    pub models: Vec<ModelName>,
}

/// Attaches spokes to the hub: name allocation plus connection issuance.
pub struct TenantOnboarder {
    broker: Arc<ConnectionBroker>,
    gateway_target: String,
}

impl TenantOnboarder {
    pub fn new(broker: Arc<ConnectionBroker>, gateway_target: impl Into<String>) -> Self {
        Self {
            broker,
            gateway_target: gateway_target.into(),
        }
    }

    /// Attach one spoke: derive its tenant id and issue its connection.
    ///
    /// The id derivation is deterministic per context, so re-running an
    /// onboarding sweep yields the same tenant identities (the connection
    /// secret is fresh each time, as with any issuance).
    ///
    /// # Errors
    /// `UnknownModel` when the spec requests an unregistered model; nothing
    /// is persisted for the failed spoke.
    #[instrument(skip(self, spec), fields(tenant = %spec.display_name))]
    pub fn onboard(&self, spec: &TenantSpec) -> Result<(Tenant, Connection), HubError> {
        let tenant_id = TenantId::new(resource_name("spoke", &allocate(&spec.context)));

        let connection = self
            .broker
            .issue(&tenant_id, &spec.models, &self.gateway_target)?;

        let tenant = Tenant {
            id: tenant_id,
            display_name: spec.display_name.clone(),
            allowed_models: connection.model_allow_list.iter().cloned().collect(),
        };

        tracing::info!(tenant = %tenant.id, connection = %connection.id, "Spoke onboarded");
        Ok((tenant, connection))
    }

    /// Attach a sequence of spokes. Fails on the first invalid spec;
    /// already-attached spokes keep their connections.
    ///
    /// # Errors
    /// Propagates the first per-spoke error.
    pub fn onboard_all(&self, specs: &[TenantSpec]) -> Result<Vec<(Tenant, Connection)>, HubError> {
        specs.iter().map(|spec| self.onboard(spec)).collect()
    }
}
