//! REST DTOs and their domain conversions.
//!
//! Domain models carry no serde; everything crossing the wire is converted
//! here, and the one place a connection secret is serialized out is
//! [`ConnectionDto`], on issue and rotate responses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use access_policy::LedgerEntry;
use connection_broker::TenantSpec;
use hub_naming::TenantContext;
use hub_sdk::{
    BackendId, Capability, Connection, ConnectionScope, HubError, LogicalModel, ModelFormat,
    ModelName, PhysicalDeployment, PolicyStep, Principal, PrincipalKind, Region, ResourceScope,
    RoutingRule, Tenant,
};

// === Backends and routing ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDto {
    pub backend_id: String,
    pub region: String,
    pub capacity_units: u32,
    pub endpoint_url: String,
}

impl From<PhysicalDeployment> for BackendDto {
    fn from(d: PhysicalDeployment) -> Self {
        Self {
            backend_id: d.backend_id.as_str().to_owned(),
            region: d.region.as_str().to_owned(),
            capacity_units: d.capacity_units,
            endpoint_url: d.endpoint_url,
        }
    }
}

impl BackendDto {
    #[must_use]
    pub fn into_deployment(self) -> PhysicalDeployment {
        PhysicalDeployment {
            backend_id: BackendId::new(self.backend_id),
            region: Region::new(self.region),
            capacity_units: self.capacity_units,
            endpoint_url: self.endpoint_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PolicyStepDto {
    InjectDefaultParam { name: String, value: String },
    SubstituteCredential,
    RateLimit { limit: u32, window_secs: u64 },
}

impl From<PolicyStep> for PolicyStepDto {
    fn from(step: PolicyStep) -> Self {
        match step {
            PolicyStep::InjectDefaultParam { name, value } => {
                Self::InjectDefaultParam { name, value }
            }
            PolicyStep::SubstituteCredential => Self::SubstituteCredential,
            PolicyStep::RateLimit { limit, window_secs } => Self::RateLimit { limit, window_secs },
        }
    }
}

impl From<PolicyStepDto> for PolicyStep {
    fn from(step: PolicyStepDto) -> Self {
        match step {
            PolicyStepDto::InjectDefaultParam { name, value } => {
                Self::InjectDefaultParam { name, value }
            }
            PolicyStepDto::SubstituteCredential => Self::SubstituteCredential,
            PolicyStepDto::RateLimit { limit, window_secs } => {
                Self::RateLimit { limit, window_secs }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterModelRequest {
    pub name: String,
    pub format: String,
    pub version: String,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    pub backend: BackendDto,
    /// Policy steps for the rule; the configured default pipeline applies
    /// when omitted.
    #[serde(default)]
    pub policy: Option<Vec<PolicyStepDto>>,
}

impl RegisterModelRequest {
    #[must_use]
    pub fn into_parts(self) -> (LogicalModel, PhysicalDeployment, Option<Vec<PolicyStep>>) {
        let model = LogicalModel {
            name: ModelName::new(self.name),
            format: ModelFormat::new(self.format),
            version: self.version,
            allowed_regions: self
                .allowed_regions
                .map(|regions| regions.into_iter().map(Region::new).collect::<BTreeSet<_>>()),
        };
        let deployment = self.backend.into_deployment();
        let policy = self
            .policy
            .map(|steps| steps.into_iter().map(PolicyStep::from).collect());
        (model, deployment, policy)
    }
}

#[derive(Debug, Serialize)]
pub struct ModelDto {
    pub name: String,
    pub format: String,
    pub version: String,
    pub allowed_regions: Option<Vec<String>>,
}

impl From<LogicalModel> for ModelDto {
    fn from(m: LogicalModel) -> Self {
        Self {
            name: m.name.as_str().to_owned(),
            format: m.format.as_str().to_owned(),
            version: m.version,
            allowed_regions: m
                .allowed_regions
                .map(|regions| regions.iter().map(|r| r.as_str().to_owned()).collect()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoutingRuleDto {
    pub model: String,
    pub backend: BackendDto,
    pub policy: Vec<PolicyStepDto>,
}

impl From<RoutingRule> for RoutingRuleDto {
    fn from(rule: RoutingRule) -> Self {
        Self {
            model: rule.model.as_str().to_owned(),
            backend: BackendDto::from(rule.backend),
            policy: rule.policy.into_iter().map(PolicyStepDto::from).collect(),
        }
    }
}

// === Tenants and connections ===

#[derive(Debug, Deserialize)]
pub struct OnboardTenantRequest {
    pub display_name: String,
    /// Platform-level identity the tenant lives under.
    pub scope: String,
    /// Tenant's declared name within that scope.
    pub name: String,
    pub models: Vec<String>,
}

impl OnboardTenantRequest {
    #[must_use]
    pub fn into_spec(self) -> TenantSpec {
        TenantSpec {
            display_name: self.display_name,
            context: TenantContext::new(self.scope, self.name),
            models: self.models.into_iter().map(ModelName::new).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantDto {
    pub id: String,
    pub display_name: String,
    pub allowed_models: Vec<String>,
}

impl From<Tenant> for TenantDto {
    fn from(t: Tenant) -> Self {
        Self {
            id: t.id.as_str().to_owned(),
            display_name: t.display_name,
            allowed_models: t
                .allowed_models
                .iter()
                .map(|m| m.as_str().to_owned())
                .collect(),
        }
    }
}

/// Issue/rotate response: the only serialization of a connection secret.
#[derive(Debug, Serialize)]
pub struct ConnectionDto {
    pub id: Uuid,
    pub owner: String,
    pub gateway_target: String,
    /// Plaintext auth material, shown exactly once. Store it; the hub
    /// keeps only a digest.
    pub auth_material: String,
    pub model_allow_list: Vec<String>,
}

impl ConnectionDto {
    #[must_use]
    pub fn from_connection(conn: &Connection) -> Self {
        Self {
            id: conn.id.as_uuid(),
            owner: conn.owner.as_str().to_owned(),
            gateway_target: conn.gateway_target.clone(),
            auth_material: conn.auth_material.expose_secret().to_owned(),
            model_allow_list: conn
                .model_allow_list
                .iter()
                .map(|m| m.as_str().to_owned())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionSummaryDto {
    pub id: Uuid,
    pub owner: String,
    pub model_allow_list: Vec<String>,
}

impl From<ConnectionScope> for ConnectionSummaryDto {
    fn from(scope: ConnectionScope) -> Self {
        Self {
            id: scope.id.as_uuid(),
            owner: scope.owner.as_str().to_owned(),
            model_allow_list: scope
                .model_allow_list
                .iter()
                .map(|m| m.as_str().to_owned())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OnboardTenantResponse {
    pub tenant: TenantDto,
    pub connection: ConnectionDto,
}

// === Grants ===

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKindDto {
    User,
    ServiceIdentity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrincipalDto {
    pub id: Uuid,
    pub kind: PrincipalKindDto,
}

impl From<PrincipalDto> for Principal {
    fn from(p: PrincipalDto) -> Self {
        let kind = match p.kind {
            PrincipalKindDto::User => PrincipalKind::User,
            PrincipalKindDto::ServiceIdentity => PrincipalKind::ServiceIdentity,
        };
        Self { id: p.id, kind }
    }
}

impl From<Principal> for PrincipalDto {
    fn from(p: Principal) -> Self {
        let kind = match p.kind {
            PrincipalKind::User => PrincipalKindDto::User,
            PrincipalKind::ServiceIdentity => PrincipalKindDto::ServiceIdentity,
        };
        Self { id: p.id, kind }
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// Identity performing the grant; the escalation guard applies to it.
    pub actor: PrincipalDto,
    pub principal: PrincipalDto,
    pub scope: String,
    pub capability: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub principal: PrincipalDto,
    pub scope: String,
    pub capability: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct LedgerEntryDto {
    pub kind: &'static str,
    pub principal: PrincipalDto,
    pub scope: String,
    pub capability: String,
    pub at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryDto {
    fn from(entry: LedgerEntry) -> Self {
        match entry {
            LedgerEntry::Granted(grant) => Self {
                kind: "granted",
                principal: PrincipalDto::from(grant.principal),
                scope: grant.scope.as_str().to_owned(),
                capability: grant.capability.as_str().to_owned(),
                at: grant.granted_at,
            },
            LedgerEntry::Revoked {
                principal,
                scope,
                capability,
                revoked_at,
            } => Self {
                kind: "revoked",
                principal: PrincipalDto::from(principal),
                scope: scope.as_str().to_owned(),
                capability: capability.as_str().to_owned(),
                at: revoked_at,
            },
        }
    }
}

/// Parse a wire capability name.
///
/// # Errors
/// `ConstraintViolation` for names outside the closed capability set.
pub fn parse_capability(raw: &str) -> Result<Capability, HubError> {
    raw.parse::<Capability>()
        .map_err(HubError::constraint_violation)
}

/// Build a resource scope from its wire form.
#[must_use]
pub fn parse_scope(raw: &str) -> ResourceScope {
    ResourceScope::new(raw)
}

// === Health ===

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "healthy" }
    }
}
