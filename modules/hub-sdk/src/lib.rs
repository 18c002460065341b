//! Shared contract for ModelHub.
//!
//! This crate holds the transport-agnostic domain models, the error taxonomy,
//! and the port traits the gateway hot path is wired through. It carries no
//! behavior beyond small constructors and accessors; every implementation
//! lives in the module crates.

pub mod api;
pub mod error;
pub mod models;

pub use api::{
    BackendCredentialSource, BackendDispatcher, BackendRequest, ConnectionAuthenticator,
    ModelResolver,
};
pub use error::HubError;
pub use models::{
    AccessGrant, BackendId, Capability, Connection, ConnectionId, ConnectionScope, InvokeRequest,
    InvokeResponse, LogicalModel, ModelFormat, ModelName, PhysicalDeployment, PolicyStep,
    Principal, PrincipalKind, Region, ResourceScope, RoutingRule, Tenant, TenantId,
};
