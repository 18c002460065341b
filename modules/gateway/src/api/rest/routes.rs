//! REST route registration.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use access_policy::PolicyEnforcer;
use connection_broker::{ConnectionBroker, TenantOnboarder};
use model_registry::ModelRegistry;

use super::handlers;
use crate::config::GatewayConfig;
use crate::domain::service::GatewayService;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GatewayService>,
    pub registry: Arc<ModelRegistry>,
    pub broker: Arc<ConnectionBroker>,
    pub onboarder: Arc<TenantOnboarder>,
    pub policy: Arc<PolicyEnforcer>,
    pub config: Arc<GatewayConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Build the gateway router: data plane plus control plane.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health probes (public)
        .route("/v1/health", get(handlers::health))
        .route("/v1/ready", get(handlers::ready))
        // Data plane
        .route("/v1/models/{model}/invoke", post(handlers::invoke))
        // Control plane: models and routing
        .route(
            "/v1/admin/models",
            post(handlers::register_model).get(handlers::list_models),
        )
        .route("/v1/admin/models/{model}", delete(handlers::decommission_model))
        .route("/v1/admin/routes", get(handlers::list_routes))
        // Control plane: tenants and connections
        .route("/v1/admin/tenants", post(handlers::onboard_tenant))
        .route("/v1/admin/connections", get(handlers::list_connections))
        .route(
            "/v1/admin/connections/{id}/rotate",
            post(handlers::rotate_connection),
        )
        .route(
            "/v1/admin/connections/{id}",
            delete(handlers::revoke_connection),
        )
        // Control plane: grants
        .route(
            "/v1/admin/grants",
            post(handlers::create_grant).get(handlers::list_grants),
        )
        .route("/v1/admin/grants/check", post(handlers::check_grant))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
