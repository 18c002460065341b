//! REST handlers.
//!
//! Handlers are thin: parse/validate input, call the domain service or the
//! module it fronts, map errors through [`super::error::ApiError`].

use std::collections::HashMap;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use uuid::Uuid;

use hub_sdk::{ConnectionId, HubError, InvokeRequest, ModelName, Principal};

use super::dto::{
    CheckRequest, CheckResponse, ConnectionDto, ConnectionSummaryDto, GrantRequest,
    HealthResponse, LedgerEntryDto, ModelDto, OnboardTenantRequest, OnboardTenantResponse,
    RegisterModelRequest, RoutingRuleDto, TenantDto, parse_capability, parse_scope,
};
use super::error::ApiError;
use super::routes::AppState;

// === Health Endpoints ===

/// GET /v1/health - Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// GET /v1/ready - Readiness probe.
pub async fn ready() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

// === Data Plane ===

/// POST /v1/models/{model}/invoke - Route a request to the model's backend.
#[tracing::instrument(skip(state, headers, body), fields(model = %model))]
pub async fn invoke(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| HubError::unauthenticated("missing bearer credential"))?;

    let mut forwarded_headers = HashMap::new();
    for (name, value) in &headers {
        // Hop-by-hop headers stay on this hop; the outbound client sets its
        // own host and content-length.
        if name == &header::HOST || name == &header::CONTENT_LENGTH {
            continue;
        }
        if let Ok(v) = value.to_str() {
            forwarded_headers.insert(name.as_str().to_owned(), v.to_owned());
        }
    }

    let request = InvokeRequest {
        headers: forwarded_headers,
        query,
        body,
    };

    let outcome = state
        .service
        .invoke(&token, &ModelName::new(model), request)
        .await?;

    // The backend body goes back unmodified; only the content type is
    // mirrored from upstream.
    let mut builder = Response::builder().status(outcome.status_code);
    if let Some(content_type) = outcome.headers.get("content-type") {
        builder = builder.header(header::CONTENT_TYPE, content_type.as_str());
    }
    builder
        .body(Body::from(outcome.body))
        .map_err(|e| ApiError::from(HubError::internal(format!("response build: {e}"))))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

// === Model Endpoints ===

/// POST /v1/admin/models - Register (or converge on) a model's routing rule.
#[tracing::instrument(skip(state, req), fields(model = %req.name))]
pub async fn register_model(
    State(state): State<AppState>,
    Json(req): Json<RegisterModelRequest>,
) -> Result<(StatusCode, Json<RoutingRuleDto>), ApiError> {
    let (model, deployment, policy) = req.into_parts();
    let policy = policy.unwrap_or_else(|| state.config.default_policy());

    let rule = state.registry.register(model, deployment, policy)?;
    Ok((StatusCode::CREATED, Json(RoutingRuleDto::from(rule))))
}

/// GET /v1/admin/models - List registered logical models.
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelDto>> {
    Json(state.registry.models().into_iter().map(ModelDto::from).collect())
}

/// GET /v1/admin/routes - List active routing rules.
pub async fn list_routes(State(state): State<AppState>) -> Json<Vec<RoutingRuleDto>> {
    Json(
        state
            .registry
            .rules()
            .into_iter()
            .map(RoutingRuleDto::from)
            .collect(),
    )
}

/// DELETE /v1/admin/models/{model} - Decommission a model. Idempotent.
#[tracing::instrument(skip(state), fields(model = %model))]
pub async fn decommission_model(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> StatusCode {
    state.registry.decommission(&ModelName::new(model));
    StatusCode::NO_CONTENT
}

// === Tenant and Connection Endpoints ===

/// POST /v1/admin/tenants - Onboard a spoke and issue its connection.
#[tracing::instrument(skip(state, req), fields(tenant = %req.display_name))]
pub async fn onboard_tenant(
    State(state): State<AppState>,
    Json(req): Json<OnboardTenantRequest>,
) -> Result<(StatusCode, Json<OnboardTenantResponse>), ApiError> {
    let spec = req.into_spec();
    let (tenant, connection) = state.onboarder.onboard(&spec)?;

    Ok((
        StatusCode::CREATED,
        Json(OnboardTenantResponse {
            tenant: TenantDto::from(tenant),
            connection: ConnectionDto::from_connection(&connection),
        }),
    ))
}

/// GET /v1/admin/connections - List live connections (no secrets).
pub async fn list_connections(State(state): State<AppState>) -> Json<Vec<ConnectionSummaryDto>> {
    Json(
        state
            .broker
            .list()
            .into_iter()
            .map(ConnectionSummaryDto::from)
            .collect(),
    )
}

/// POST /v1/admin/connections/{id}/rotate - Rotate auth material.
#[tracing::instrument(skip(state), fields(connection = %id))]
pub async fn rotate_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionDto>, ApiError> {
    let connection = state.broker.rotate(ConnectionId::from_uuid(id))?;
    Ok(Json(ConnectionDto::from_connection(&connection)))
}

/// DELETE /v1/admin/connections/{id} - Revoke a connection. Idempotent.
#[tracing::instrument(skip(state), fields(connection = %id))]
pub async fn revoke_connection(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    state.broker.revoke(ConnectionId::from_uuid(id));
    StatusCode::NO_CONTENT
}

// === Grant Endpoints ===

/// POST /v1/admin/grants - Record a capability grant.
#[tracing::instrument(skip(state, req), fields(scope = %req.scope, capability = %req.capability))]
pub async fn create_grant(
    State(state): State<AppState>,
    Json(req): Json<GrantRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = Principal::from(req.actor);
    let grantee = Principal::from(req.principal);
    let capability = parse_capability(&req.capability)?;

    state
        .policy
        .grant(&actor, grantee, parse_scope(&req.scope), capability)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/grants/check - Evaluate a capability check.
pub async fn check_grant(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let principal = Principal::from(req.principal);
    let capability = parse_capability(&req.capability)?;

    let allowed = state
        .policy
        .check(&principal, &parse_scope(&req.scope), capability);
    Ok(Json(CheckResponse { allowed }))
}

/// GET /v1/admin/grants - The append-only grant ledger, oldest first.
pub async fn list_grants(State(state): State<AppState>) -> Json<Vec<LedgerEntryDto>> {
    Json(
        state
            .policy
            .history()
            .into_iter()
            .map(LedgerEntryDto::from)
            .collect(),
    )
}
