//! ModelHub domain models.
//!
//! These are transport-agnostic models used across the hub.
//! Note: NO serde derives here - serialization lives in the REST DTO layer.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use uuid::Uuid;

/// Caller-facing name of an inference capability (e.g. `gpt-4.1-mini`),
/// independent of where it physically runs. Unique within one hub.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider family a logical model speaks (e.g. `openai`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelFormat(String);

impl ModelFormat {
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deployment region identifier (e.g. `swedencentral`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Region(String);

impl Region {
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derived, collision-resistant tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a capacity-provisioned backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical consumer attached to the hub (a "spoke").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    /// Derived, collision-resistant identifier.
    pub id: TenantId,
    /// Human-readable name for display.
    pub display_name: String,
    /// Logical models this tenant may be issued connections for.
    pub allowed_models: BTreeSet<ModelName>,
}

/// A caller-facing model definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalModel {
    /// Unique name within the hub.
    pub name: ModelName,
    /// Provider family.
    pub format: ModelFormat,
    /// Model version label.
    pub version: String,
    /// Placement restriction: when set, backends for this model must be
    /// deployed in one of these regions.
    pub allowed_regions: Option<BTreeSet<Region>>,
}

/// A concrete, capacity-provisioned backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalDeployment {
    /// Backend identifier.
    pub backend_id: BackendId,
    /// Region the capacity lives in.
    pub region: Region,
    /// Provisioned capacity units.
    pub capacity_units: u32,
    /// Endpoint base URL.
    pub endpoint_url: String,
}

/// One named step of the per-rule request policy pipeline.
///
/// Steps are executed in sequence order by the router, so a rule's policy is
/// explicit, orderable, and testable without a templating language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyStep {
    /// Inject a query parameter with a default value when the caller omitted
    /// it. A parameter the caller explicitly supplied is never changed.
    InjectDefaultParam { name: String, value: String },
    /// Discard any caller-supplied backend credential and attach the
    /// hub-held, backend-scoped credential instead.
    SubstituteCredential,
    /// Fixed-window quota per connection.
    RateLimit { limit: u32, window_secs: u64 },
}

/// Binds a logical model to a physical deployment plus its policy pipeline.
///
/// Exactly one rule is active per logical model at any time; replacing it is
/// atomic from the router's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// The logical model this rule routes.
    pub model: ModelName,
    /// The backend requests are dispatched to.
    pub backend: PhysicalDeployment,
    /// Ordered policy steps applied before dispatch.
    pub policy: Vec<PolicyStep>,
}

/// Connection identifier, stable across auth-material rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The credential object handed to a tenant.
///
/// `auth_material` is the only copy of the plaintext secret the hub ever
/// returns; it is handed out on issue and rotate and stored only as a digest.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Stable identity, preserved across rotation.
    pub id: ConnectionId,
    /// Tenant owning the connection.
    pub owner: TenantId,
    /// Gateway endpoint this connection authenticates against.
    pub gateway_target: String,
    /// Opaque secret presented by the caller. Debug prints redacted.
    pub auth_material: SecretString,
    /// Logical models this connection may invoke. Insertion order is kept
    /// for display only; membership is what authorization checks.
    pub model_allow_list: Vec<ModelName>,
    /// Issuance timestamp.
    pub created_at: DateTime<Utc>,
}

/// The authenticated view of a connection, as seen by the router.
///
/// Carries no secret material: authentication already happened when one of
/// these exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionScope {
    pub id: ConnectionId,
    pub owner: TenantId,
    pub model_allow_list: Vec<ModelName>,
}

impl ConnectionScope {
    /// Whether this connection may invoke the given logical model.
    #[must_use]
    pub fn allows(&self, model: &ModelName) -> bool {
        self.model_allow_list.contains(model)
    }
}

/// Kind of an identity known to the policy enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    /// A human operator.
    User,
    /// An automated identity (e.g. a tenant's agent or the gateway itself).
    ServiceIdentity,
}

/// A typed identity that capabilities are granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: Uuid,
    pub kind: PrincipalKind,
}

impl Principal {
    #[must_use]
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            kind: PrincipalKind::User,
        }
    }

    #[must_use]
    pub fn service_identity(id: Uuid) -> Self {
        Self {
            id,
            kind: PrincipalKind::ServiceIdentity,
        }
    }

    #[must_use]
    pub fn is_service_identity(&self) -> bool {
        self.kind == PrincipalKind::ServiceIdentity
    }
}

/// Coarse named permission checked by the policy enforcer.
///
/// Deliberately a closed set: provider-specific permission strings are
/// translated at the platform boundary, never inside the enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadIndexData,
    ManageDeployments,
    InvokeModel,
    InvokeOwnResources,
}

impl Capability {
    /// Whether a service identity may grant this capability to itself.
    ///
    /// Everything administrative is excluded so a spoke's own automation
    /// cannot widen its own access.
    #[must_use]
    pub fn is_self_grantable(&self) -> bool {
        matches!(self, Self::InvokeOwnResources)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadIndexData => "read-index-data",
            Self::ManageDeployments => "manage-deployments",
            Self::InvokeModel => "invoke-model",
            Self::InvokeOwnResources => "invoke-own-resources",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-index-data" => Ok(Self::ReadIndexData),
            "manage-deployments" => Ok(Self::ManageDeployments),
            "invoke-model" => Ok(Self::InvokeModel),
            "invoke-own-resources" => Ok(Self::InvokeOwnResources),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// Resource a capability applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceScope(String);

impl ResourceScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Scope covering a single backend deployment.
    #[must_use]
    pub fn backend(backend_id: &BackendId) -> Self {
        Self(format!("backend/{backend_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record that a principal may perform a capability against a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub principal: Principal,
    pub scope: ResourceScope,
    pub capability: Capability,
    pub granted_at: DateTime<Utc>,
}

/// Inbound gateway request, after transport decoding.
#[derive(Debug, Clone, Default)]
pub struct InvokeRequest {
    /// Caller-supplied headers (credential headers are stripped before
    /// dispatch when the rule substitutes credentials).
    pub headers: HashMap<String, String>,
    /// Caller-supplied query parameters.
    pub query: HashMap<String, String>,
    /// JSON request body, passed through to the backend unmodified.
    pub body: Bytes,
}

/// Backend response surfaced to the caller.
#[derive(Debug, Clone)]
pub struct InvokeResponse {
    /// HTTP status from the backend.
    pub status_code: u16,
    /// Backend response headers.
    pub headers: HashMap<String, String>,
    /// Backend response body, unmodified.
    pub body: Bytes,
    /// Total dispatch duration in milliseconds.
    pub duration_ms: u64,
    /// Backend that served the request.
    pub backend_id: BackendId,
}
