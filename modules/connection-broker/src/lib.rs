//! Connection broker: the credential boundary between spokes and the hub.
//!
//! Tenants authenticate to the gateway with broker-issued material; the
//! backends never see it. Only a digest of each credential is stored, so a
//! dump of broker state cannot be replayed against the gateway.

mod broker;
mod onboarding;

pub use broker::ConnectionBroker;
pub use onboarding::{TenantOnboarder, TenantSpec};
