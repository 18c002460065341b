//! Declarative startup seeding.
//!
//! The configuration carries the hub's desired state: model deployments,
//! spokes, and backend credentials. Applying it is convergent - re-running
//! the seed against the same configuration re-registers identical rules
//! without duplicating them and re-derives the same tenant identities.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::SecretString;
use uuid::Uuid;

use access_policy::PolicyEnforcer;
use connection_broker::{ConnectionBroker, TenantOnboarder, TenantSpec};
use hub_gateway::{
    AppState, GatewayService, HttpDispatcher, ServiceConfig, StaticCredentialSource,
};
use hub_naming::TenantContext;
use hub_sdk::{
    BackendId, Capability, LogicalModel, ModelFormat, ModelName, PhysicalDeployment, PolicyStep,
    Principal, Region, ResourceScope,
};
use model_registry::{DeploymentSpec, ModelRegistry, ProvisioningEngine, StaticProvisioner};

use crate::config::{AppConfig, ModelConfig};

/// Build and seed the full hub from configuration.
///
/// # Errors
/// Fails on constraint violations in the model list, unknown models in a
/// tenant's request, or a backend credential referencing no known backend.
pub async fn build_hub(config: &AppConfig) -> Result<AppState> {
    let registry = Arc::new(ModelRegistry::new());
    let policy = Arc::new(PolicyEnforcer::new());
    let provisioner = StaticProvisioner::new(&config.hub.provisioner_base_url);

    // The two standing identities: a human bootstrap admin performing the
    // seed grants, and the gateway's own service identity.
    let admin = Principal::user(Uuid::new_v4());
    let gateway_identity = Principal::service_identity(Uuid::new_v4());

    let mut credentials: HashMap<BackendId, SecretString> = HashMap::new();

    for model_cfg in &config.hub.models {
        let deployment = deployment_for(model_cfg, &provisioner, &policy, &admin).await?;
        let backend_id = deployment.backend_id.clone();

        let model = LogicalModel {
            name: ModelName::new(&model_cfg.name),
            format: ModelFormat::new(&model_cfg.format),
            version: model_cfg.version.clone(),
            allowed_regions: model_cfg
                .allowed_regions
                .as_ref()
                .map(|regions| regions.iter().map(Region::new).collect()),
        };

        let mut steps = vec![
            PolicyStep::InjectDefaultParam {
                name: config.gateway.default_api_version_param.clone(),
                value: config.gateway.default_api_version.clone(),
            },
            PolicyStep::SubstituteCredential,
        ];
        steps.push(match &model_cfg.rate_limit {
            Some(limit) => PolicyStep::RateLimit {
                limit: limit.limit,
                window_secs: limit.window_secs,
            },
            None => PolicyStep::RateLimit {
                limit: config.gateway.rate_limit_requests,
                window_secs: config.gateway.rate_limit_window_secs,
            },
        });

        registry
            .register(model, deployment, steps)
            .with_context(|| format!("registering model {}", model_cfg.name))?;

        // The gateway may exchange credentials for this backend.
        policy
            .grant(
                &admin,
                gateway_identity,
                ResourceScope::backend(&backend_id),
                Capability::InvokeModel,
            )
            .context("bootstrap gateway grant")?;

        if let Some(secret) = config.hub.backend_credentials.get(backend_id.as_str()) {
            credentials.insert(backend_id.clone(), SecretString::from(secret.clone()));
        } else {
            tracing::warn!(backend = %backend_id, "No backend credential configured");
        }
    }

    let broker = Arc::new(ConnectionBroker::new(Arc::clone(&registry)));
    let onboarder = Arc::new(TenantOnboarder::new(
        Arc::clone(&broker),
        config.hub.gateway_target.clone(),
    ));

    let specs: Vec<TenantSpec> = config
        .hub
        .tenants
        .iter()
        .map(|t| TenantSpec {
            display_name: t.display_name.clone(),
            context: TenantContext::new(
                t.scope.clone().unwrap_or_else(|| config.hub.default_scope.clone()),
                t.name.clone(),
            ),
            models: t.models.iter().map(|m| ModelName::new(m.clone())).collect(),
        })
        .collect();

    let onboarded = onboarder.onboard_all(&specs).context("onboarding tenants")?;
    for (tenant, connection) in &onboarded {
        // Material is not logged; operators rotate to obtain a secret for a
        // seeded connection.
        tracing::info!(
            tenant = %tenant.id,
            connection = %connection.id,
            models = connection.model_allow_list.len(),
            "Seeded spoke"
        );
    }

    let gateway_config = Arc::new(config.gateway.clone());
    let service = Arc::new(GatewayService::new(
        Arc::clone(&broker) as _,
        Arc::clone(&registry) as _,
        Arc::new(StaticCredentialSource::new(credentials)),
        Arc::new(HttpDispatcher::new().context("building HTTP dispatcher")?),
        Arc::clone(&policy),
        gateway_identity,
        ServiceConfig::from(gateway_config.as_ref()),
    ));

    Ok(AppState {
        service,
        registry,
        broker,
        onboarder,
        policy,
        config: gateway_config,
    })
}

async fn deployment_for(
    model_cfg: &ModelConfig,
    provisioner: &StaticProvisioner,
    policy: &PolicyEnforcer,
    admin: &Principal,
) -> Result<PhysicalDeployment> {
    if let Some(endpoint_url) = &model_cfg.endpoint_url {
        let backend_id = model_cfg
            .backend_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", model_cfg.name, model_cfg.region));
        return Ok(PhysicalDeployment {
            backend_id: BackendId::new(backend_id),
            region: Region::new(&model_cfg.region),
            capacity_units: model_cfg.capacity_units,
            endpoint_url: endpoint_url.clone(),
        });
    }

    // No explicit endpoint: go through the provisioning boundary and let
    // the backend's managed identity reach its own resources.
    let provisioned = provisioner
        .provision(DeploymentSpec {
            model_name: ModelName::new(&model_cfg.name),
            format: ModelFormat::new(&model_cfg.format),
            region: Region::new(&model_cfg.region),
            capacity_units: model_cfg.capacity_units,
        })
        .await
        .with_context(|| format!("provisioning backend for {}", model_cfg.name))?;

    policy
        .grant(
            admin,
            provisioned.managed_identity,
            ResourceScope::backend(&provisioned.deployment.backend_id),
            Capability::InvokeOwnResources,
        )
        .context("granting managed identity access")?;

    Ok(provisioned.deployment)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{ModelRateLimitConfig, TenantConfig};

    fn seed_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.hub.models = vec![
            ModelConfig {
                name: "gpt-4.1-mini".into(),
                format: "openai".into(),
                version: "2025-04-14".into(),
                allowed_regions: None,
                region: "swedencentral".into(),
                capacity_units: 50,
                endpoint_url: Some("https://b1.backends.local".into()),
                backend_id: Some("b1".into()),
                rate_limit: Some(ModelRateLimitConfig {
                    limit: 100,
                    window_secs: 60,
                }),
            },
            ModelConfig {
                name: "gpt-image-1".into(),
                format: "openai".into(),
                version: "1".into(),
                allowed_regions: Some(vec!["swedencentral".into()]),
                region: "swedencentral".into(),
                capacity_units: 10,
                endpoint_url: None,
                backend_id: None,
                rate_limit: None,
            },
        ];
        config.hub.tenants = vec![TenantConfig {
            display_name: "contoso-support".into(),
            scope: None,
            name: "contoso-support".into(),
            models: vec!["gpt-4.1-mini".into()],
        }];
        config
            .hub
            .backend_credentials
            .insert("b1".into(), "backend-secret-b1".into());
        config
    }

    #[tokio::test]
    async fn seeds_models_tenants_and_grants() {
        let state = build_hub(&seed_config()).await.expect("seed");

        assert_eq!(state.registry.models().len(), 2);
        assert!(state.registry.is_known(&ModelName::new("gpt-4.1-mini")));

        let connections = state.broker.list();
        assert_eq!(connections.len(), 1);
        assert!(connections[0].allows(&ModelName::new("gpt-4.1-mini")));

        // One invoke-model grant per backend plus the provisioned backend's
        // own-resources grant.
        assert_eq!(state.policy.history().len(), 3);
    }

    #[tokio::test]
    async fn reseeding_converges() {
        let config = seed_config();
        let state = build_hub(&config).await.expect("seed");
        let rules_before = state.registry.rules();

        // Re-applying the same declaration to the same registry must not
        // duplicate rules.
        for model_cfg in &config.hub.models {
            if let Some(endpoint_url) = &model_cfg.endpoint_url {
                let model = LogicalModel {
                    name: ModelName::new(&model_cfg.name),
                    format: ModelFormat::new(&model_cfg.format),
                    version: model_cfg.version.clone(),
                    allowed_regions: None,
                };
                let deployment = PhysicalDeployment {
                    backend_id: BackendId::new("b1"),
                    region: Region::new(&model_cfg.region),
                    capacity_units: model_cfg.capacity_units,
                    endpoint_url: endpoint_url.clone(),
                };
                let steps = rules_before
                    .iter()
                    .find(|r| r.model == model.name)
                    .expect("rule")
                    .policy
                    .clone();
                state
                    .registry
                    .register(model, deployment, steps)
                    .expect("idempotent");
            }
        }
        assert_eq!(state.registry.rules().len(), rules_before.len());
    }

    #[tokio::test]
    async fn tenant_requesting_unknown_model_fails_seed() {
        let mut config = seed_config();
        config.hub.tenants[0].models.push("gpt-5".into());

        let err = build_hub(&config).await.expect_err("unknown model");
        assert!(err.to_string().contains("onboarding tenants"));
    }
}
