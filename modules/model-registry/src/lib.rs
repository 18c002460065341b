//! Model registry: logical model names mapped to physical deployments.
//!
//! Registry state is an immutable snapshot behind an atomic pointer.
//! Registration builds a fresh snapshot and swaps it in; readers always see
//! exactly one version, never a partially-applied change.

mod ports;
mod registry;

pub use ports::{DeploymentSpec, ProvisionedBackend, ProvisioningEngine, StaticProvisioner};
pub use registry::ModelRegistry;
