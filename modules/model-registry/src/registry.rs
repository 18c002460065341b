//! Registry core: snapshot state and the registration/resolution API.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::instrument;

use hub_sdk::{
    HubError, LogicalModel, ModelName, ModelResolver, PhysicalDeployment, PolicyStep, Region,
    RoutingRule,
};

/// General backend mapping used when no per-model rule exists.
///
/// An explicit per-model rule always wins over this; a fallback alone never
/// makes a model "known" for issuance validation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FallbackRule {
    backend: PhysicalDeployment,
    policy: Vec<PolicyStep>,
}

#[derive(Debug, Default)]
struct RegistryState {
    models: HashMap<ModelName, LogicalModel>,
    rules: HashMap<ModelName, RoutingRule>,
    fallback: Option<FallbackRule>,
}

/// Mapping of logical model name to physical backend plus policy.
///
/// Reads load one atomic snapshot; writes serialize on a coarse lock and
/// publish a fresh snapshot. Different requests may observe different
/// registry versions, but never a partial one.
pub struct ModelRegistry {
    state: ArcSwap<RegistryState>,
    write_lock: Mutex<()>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(RegistryState::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register (or converge on) the routing rule for a logical model.
    ///
    /// Re-submitting an identical `(model, deployment, policy)` tuple
    /// returns the existing rule unchanged; a differing tuple for the same
    /// name atomically replaces the active rule, so exactly one rule is
    /// ever live per model.
    ///
    /// # Errors
    /// `ConstraintViolation` when the model is region-restricted and the
    /// deployment lies outside its allowed set.
    #[instrument(skip(self, model, deployment, policy), fields(model = %model.name))]
    pub fn register(
        &self,
        model: LogicalModel,
        deployment: PhysicalDeployment,
        policy: Vec<PolicyStep>,
    ) -> Result<RoutingRule, HubError> {
        if let Some(allowed) = &model.allowed_regions {
            if !allowed.contains(&deployment.region) {
                return Err(HubError::constraint_violation(format!(
                    "model {} is restricted to regions {:?}, got {}",
                    model.name,
                    allowed.iter().map(Region::as_str).collect::<Vec<_>>(),
                    deployment.region
                )));
            }
        }

        let _guard = self.write_lock.lock();
        let current = self.state.load();

        let rule = RoutingRule {
            model: model.name.clone(),
            backend: deployment,
            policy,
        };

        if let (Some(existing_model), Some(existing_rule)) = (
            current.models.get(&model.name),
            current.rules.get(&model.name),
        ) {
            if *existing_model == model && *existing_rule == rule {
                // Idempotent re-registration: converge, do not duplicate.
                return Ok(existing_rule.clone());
            }
        }

        let mut next = RegistryState {
            models: current.models.clone(),
            rules: current.rules.clone(),
            fallback: current.fallback.clone(),
        };
        next.models.insert(model.name.clone(), model);
        next.rules.insert(rule.model.clone(), rule.clone());
        self.state.store(Arc::new(next));

        tracing::info!(model = %rule.model, backend = %rule.backend.backend_id, "Routing rule registered");
        Ok(rule)
    }

    /// Install the general backend mapping. Idempotent.
    pub fn register_fallback(&self, backend: PhysicalDeployment, policy: Vec<PolicyStep>) {
        let _guard = self.write_lock.lock();
        let current = self.state.load();

        let fallback = FallbackRule { backend, policy };
        if current.fallback.as_ref() == Some(&fallback) {
            return;
        }

        let next = RegistryState {
            models: current.models.clone(),
            rules: current.rules.clone(),
            fallback: Some(fallback),
        };
        self.state.store(Arc::new(next));
    }

    /// Remove a model's rule and definition. Returns whether anything was
    /// removed; removing an absent model is not an error.
    #[instrument(skip(self), fields(model = %name))]
    pub fn decommission(&self, name: &ModelName) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.state.load();

        if !current.rules.contains_key(name) && !current.models.contains_key(name) {
            return false;
        }

        let mut next = RegistryState {
            models: current.models.clone(),
            rules: current.rules.clone(),
            fallback: current.fallback.clone(),
        };
        next.models.remove(name);
        next.rules.remove(name);
        self.state.store(Arc::new(next));

        tracing::info!(model = %name, "Model decommissioned");
        true
    }

    /// Resolve a model to its active routing rule from one snapshot.
    ///
    /// An explicit per-model rule wins; otherwise the fallback mapping (if
    /// installed) serves the name.
    #[must_use]
    pub fn resolve(&self, name: &ModelName) -> Option<RoutingRule> {
        let state = self.state.load();
        if let Some(rule) = state.rules.get(name) {
            return Some(rule.clone());
        }
        state.fallback.as_ref().map(|fb| RoutingRule {
            model: name.clone(),
            backend: fb.backend.clone(),
            policy: fb.policy.clone(),
        })
    }

    /// Whether the hub knows this logical model (explicit rules only).
    #[must_use]
    pub fn is_known(&self, name: &ModelName) -> bool {
        self.state.load().models.contains_key(name)
    }

    /// First name in `names` the hub does not know, read from one snapshot
    /// so a whole batch is validated against a single registry version.
    #[must_use]
    pub fn first_unknown<'a>(&self, names: &'a [ModelName]) -> Option<&'a ModelName> {
        let state = self.state.load();
        names.iter().find(|name| !state.models.contains_key(name))
    }

    /// All registered logical models, for the control-plane listing.
    #[must_use]
    pub fn models(&self) -> Vec<LogicalModel> {
        let state = self.state.load();
        let mut models: Vec<_> = state.models.values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    /// All active routing rules, for the control-plane listing.
    #[must_use]
    pub fn rules(&self) -> Vec<RoutingRule> {
        let state = self.state.load();
        let mut rules: Vec<_> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.model.cmp(&b.model));
        rules
    }
}

#[async_trait]
impl ModelResolver for ModelRegistry {
    async fn resolve(&self, name: &ModelName) -> Result<RoutingRule, HubError> {
        ModelRegistry::resolve(self, name)
            .ok_or_else(|| HubError::backend_unavailable(name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use hub_sdk::{BackendId, ModelFormat};

    fn model(name: &str) -> LogicalModel {
        LogicalModel {
            name: ModelName::new(name),
            format: ModelFormat::new("openai"),
            version: "2025-04-14".into(),
            allowed_regions: None,
        }
    }

    fn restricted_model(name: &str, regions: &[&str]) -> LogicalModel {
        LogicalModel {
            allowed_regions: Some(regions.iter().map(|r| Region::new(*r)).collect::<BTreeSet<_>>()),
            ..model(name)
        }
    }

    fn deployment(id: &str, region: &str) -> PhysicalDeployment {
        PhysicalDeployment {
            backend_id: BackendId::new(id),
            region: Region::new(region),
            capacity_units: 50,
            endpoint_url: format!("https://{id}.backends.local"),
        }
    }

    #[test]
    fn register_then_resolve() {
        let registry = ModelRegistry::new();
        registry
            .register(model("gpt-4.1-mini"), deployment("b1", "swedencentral"), vec![])
            .expect("register");

        let rule = registry
            .resolve(&ModelName::new("gpt-4.1-mini"))
            .expect("resolve");
        assert_eq!(rule.backend.backend_id, BackendId::new("b1"));
    }

    #[test]
    fn resolve_unknown_is_none() {
        let registry = ModelRegistry::new();
        assert!(registry.resolve(&ModelName::new("nope")).is_none());
    }

    #[test]
    fn identical_reregistration_converges() {
        let registry = ModelRegistry::new();
        let first = registry
            .register(model("gpt-4.1-mini"), deployment("b1", "swedencentral"), vec![])
            .expect("first");
        let second = registry
            .register(model("gpt-4.1-mini"), deployment("b1", "swedencentral"), vec![])
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(registry.rules().len(), 1);
    }

    #[test]
    fn differing_reregistration_replaces_the_rule() {
        let registry = ModelRegistry::new();
        registry
            .register(model("gpt-4.1-mini"), deployment("b1", "swedencentral"), vec![])
            .expect("first");
        registry
            .register(model("gpt-4.1-mini"), deployment("b2", "westeurope"), vec![])
            .expect("second");

        let rule = registry
            .resolve(&ModelName::new("gpt-4.1-mini"))
            .expect("resolve");
        assert_eq!(rule.backend.backend_id, BackendId::new("b2"));
        assert_eq!(registry.rules().len(), 1, "exactly one active rule per model");
    }

    #[test]
    fn region_pinning_rejects_outside_deployment() {
        let registry = ModelRegistry::new();
        let err = registry
            .register(
                restricted_model("gpt-image-1", &["swedencentral"]),
                deployment("b1", "westeurope"),
                vec![],
            )
            .expect_err("must violate placement");
        assert!(matches!(err, HubError::ConstraintViolation { .. }));
        assert!(!registry.is_known(&ModelName::new("gpt-image-1")));
    }

    #[test]
    fn region_pinning_accepts_allowed_deployment() {
        let registry = ModelRegistry::new();
        registry
            .register(
                restricted_model("gpt-image-1", &["swedencentral"]),
                deployment("b1", "swedencentral"),
                vec![],
            )
            .expect("inside the allowed set");

        let rule = registry
            .resolve(&ModelName::new("gpt-image-1"))
            .expect("resolve");
        assert_eq!(rule.backend.region, Region::new("swedencentral"));
    }

    #[test]
    fn explicit_rule_beats_fallback() {
        let registry = ModelRegistry::new();
        registry.register_fallback(deployment("shared", "westeurope"), vec![]);
        registry
            .register(model("gpt-image-1"), deployment("pinned", "swedencentral"), vec![])
            .expect("register");

        let pinned = registry
            .resolve(&ModelName::new("gpt-image-1"))
            .expect("resolve pinned");
        assert_eq!(pinned.backend.backend_id, BackendId::new("pinned"));

        let other = registry
            .resolve(&ModelName::new("gpt-4.1-mini"))
            .expect("resolve via fallback");
        assert_eq!(other.backend.backend_id, BackendId::new("shared"));
    }

    #[test]
    fn fallback_does_not_make_models_known() {
        let registry = ModelRegistry::new();
        registry.register_fallback(deployment("shared", "westeurope"), vec![]);
        assert!(!registry.is_known(&ModelName::new("gpt-4.1-mini")));
    }

    #[test]
    fn decommission_is_idempotent() {
        let registry = ModelRegistry::new();
        registry
            .register(model("gpt-4.1-mini"), deployment("b1", "swedencentral"), vec![])
            .expect("register");

        assert!(registry.decommission(&ModelName::new("gpt-4.1-mini")));
        assert!(registry.resolve(&ModelName::new("gpt-4.1-mini")).is_none());
        assert!(!registry.decommission(&ModelName::new("gpt-4.1-mini")));
    }

    #[tokio::test]
    async fn resolver_port_maps_missing_rule() {
        let registry = ModelRegistry::new();
        let err = ModelResolver::resolve(&registry, &ModelName::new("gone"))
            .await
            .expect_err("no rule");
        assert!(matches!(err, HubError::BackendUnavailable { .. }));
    }
}
