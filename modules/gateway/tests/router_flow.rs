//! End-to-end router tests: real registry, broker, policy enforcer, and
//! HTTP dispatcher against a mock backend; requests driven through the
//! axum router in-process.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use httpmock::prelude::*;
use secrecy::SecretString;
use tower::ServiceExt;
use uuid::Uuid;

use access_policy::PolicyEnforcer;
use connection_broker::{ConnectionBroker, TenantOnboarder};
use hub_gateway::{
    AppState, GatewayConfig, GatewayService, HttpDispatcher, ManualClock, ServiceConfig, router,
};
use hub_sdk::{
    BackendId, Capability, LogicalModel, ModelFormat, ModelName, PhysicalDeployment, PolicyStep,
    Principal, Region, ResourceScope,
};
use model_registry::ModelRegistry;

const GATEWAY_TARGET: &str = "http://hub.local/v1";

struct Hub {
    app: Router,
    backend: MockServer,
}

async fn hub() -> Hub {
    let backend = MockServer::start_async().await;

    let registry = Arc::new(ModelRegistry::new());
    registry
        .register(
            LogicalModel {
                name: ModelName::new("gpt-4.1-mini"),
                format: ModelFormat::new("openai"),
                version: "2025-04-14".into(),
                allowed_regions: None,
            },
            PhysicalDeployment {
                backend_id: BackendId::new("b1"),
                region: Region::new("swedencentral"),
                capacity_units: 50,
                endpoint_url: backend.url("/chat/completions"),
            },
            vec![
                PolicyStep::InjectDefaultParam {
                    name: "api-version".into(),
                    value: "2024-10-21".into(),
                },
                PolicyStep::SubstituteCredential,
                PolicyStep::RateLimit {
                    limit: 2,
                    window_secs: 60,
                },
            ],
        )
        .expect("register");

    let broker = Arc::new(ConnectionBroker::new(Arc::clone(&registry)));
    let onboarder = Arc::new(TenantOnboarder::new(Arc::clone(&broker), GATEWAY_TARGET));

    let policy = Arc::new(PolicyEnforcer::new());
    let admin = Principal::user(Uuid::new_v4());
    let gateway_identity = Principal::service_identity(Uuid::new_v4());
    policy
        .grant(
            &admin,
            gateway_identity,
            ResourceScope::backend(&BackendId::new("b1")),
            Capability::InvokeModel,
        )
        .expect("bootstrap grant");

    let credentials = hub_gateway::StaticCredentialSource::new(HashMap::from([(
        BackendId::new("b1"),
        SecretString::from("backend-secret-b1"),
    )]));

    let config = Arc::new(GatewayConfig::default());
    // Pinned mid-window so quota assertions cannot straddle a boundary.
    let service = Arc::new(GatewayService::with_clock(
        Arc::clone(&broker) as _,
        Arc::clone(&registry) as _,
        Arc::new(credentials),
        Arc::new(HttpDispatcher::new().expect("client")),
        Arc::clone(&policy),
        gateway_identity,
        ServiceConfig::from(config.as_ref()),
        Arc::new(ManualClock::at(1_000_000)),
    ));

    let app = router(AppState {
        service,
        registry,
        broker,
        onboarder,
        policy,
        config,
    });

    Hub { app, backend }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value, http::HeaderMap) {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json, headers)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn onboard(app: &Router, name: &str, models: &[&str]) -> (String, String) {
    let (status, body, _) = send(
        app,
        json_request(
            "POST",
            "/v1/admin/tenants",
            serde_json::json!({
                "display_name": name,
                "scope": "sub-1/rg-ai",
                "name": name,
                "models": models,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let connection_id = body["connection"]["id"].as_str().expect("id").to_owned();
    let token = body["connection"]["auth_material"]
        .as_str()
        .expect("secret")
        .to_owned();
    (connection_id, token)
}

fn invoke_request(model: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/models/{model}/invoke"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"messages\":[]}"))
        .expect("request")
}

#[tokio::test]
async fn invoke_round_trip_substitutes_credential_and_injects_default() {
    let hub = hub().await;
    let mock = hub
        .backend
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .query_param("api-version", "2024-10-21")
                .header("authorization", "Bearer backend-secret-b1");
            then.status(200)
                .header("content-type", "application/json")
                .body("{\"choices\":[]}");
        })
        .await;

    let (_, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    let (status, body, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    mock.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"choices": []}));
}

#[tokio::test]
async fn model_outside_allow_list_is_forbidden() {
    let hub = hub().await;
    let (_, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    let (status, body, _) = send(&hub.app, invoke_request("gpt-4.1", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "HUB_MODEL_NOT_ALLOWED");
}

#[tokio::test]
async fn onboarding_with_unknown_model_persists_nothing() {
    let hub = hub().await;

    let (status, body, _) = send(
        &hub.app,
        json_request(
            "POST",
            "/v1/admin/tenants",
            serde_json::json!({
                "display_name": "contoso-sales",
                "scope": "sub-1/rg-ai",
                "name": "contoso-sales",
                "models": ["gpt-4.1-mini", "gpt-5"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "HUB_UNKNOWN_MODEL");

    let (status, body, _) = send(
        &hub.app,
        Request::builder()
            .uri("/v1/admin/connections")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn revoked_connection_is_unauthenticated_and_revoke_is_idempotent() {
    let hub = hub().await;
    hub.backend
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("{}");
        })
        .await;

    let (connection_id, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    let (status, _, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..2 {
        let (status, _, _) = send(
            &hub.app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/admin/connections/{connection_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT, "revoke is idempotent");
    }

    let (status, body, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "HUB_UNAUTHENTICATED");
}

#[tokio::test]
async fn rotation_cuts_over_immediately() {
    let hub = hub().await;
    hub.backend
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("{}");
        })
        .await;

    let (connection_id, old_token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    let (status, body, _) = send(
        &hub.app,
        Request::builder()
            .method("POST")
            .uri(format!("/v1/admin/connections/{connection_id}/rotate"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_str(), Some(connection_id.as_str()), "identity preserved");
    let new_token = body["auth_material"].as_str().expect("secret").to_owned();

    let (status, _, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &old_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "old material is dead");

    let (status, _, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &new_token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn quota_rejects_with_retry_after() {
    let hub = hub().await;
    hub.backend
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).body("{}");
        })
        .await;

    let (_, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    for _ in 0..2 {
        let (status, _, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body, headers) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "HUB_RATE_LIMITED");
    assert!(
        headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .is_some_and(|secs| secs > 0 && secs <= 60),
        "retry-after hints at the window end"
    );
}

#[tokio::test]
async fn decommissioned_model_is_backend_unavailable() {
    let hub = hub().await;
    let (_, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;

    let (status, _, _) = send(
        &hub.app,
        Request::builder()
            .method("DELETE")
            .uri("/v1/admin/models/gpt-4.1-mini")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Still allow-listed on the connection, but the registry is
    // authoritative.
    let (status, body, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "HUB_BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn upstream_5xx_surfaces_as_bad_gateway() {
    let hub = hub().await;
    hub.backend
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("boom");
        })
        .await;

    let (_, token) = onboard(&hub.app, "contoso-support", &["gpt-4.1-mini"]).await;
    let (status, body, _) = send(&hub.app, invoke_request("gpt-4.1-mini", &token)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "HUB_BACKEND_ERROR");
}

#[tokio::test]
async fn region_restricted_registration_is_validated() {
    let hub = hub().await;

    let outside = serde_json::json!({
        "name": "gpt-image-1",
        "format": "openai",
        "version": "1",
        "allowed_regions": ["swedencentral"],
        "backend": {
            "backend_id": "img-west",
            "region": "westeurope",
            "capacity_units": 10,
            "endpoint_url": "https://img-west.backends.local",
        },
    });
    let (status, body, _) = send(&hub.app, json_request("POST", "/v1/admin/models", outside)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "HUB_CONSTRAINT_VIOLATION");

    let inside = serde_json::json!({
        "name": "gpt-image-1",
        "format": "openai",
        "version": "1",
        "allowed_regions": ["swedencentral"],
        "backend": {
            "backend_id": "img-sweden",
            "region": "swedencentral",
            "capacity_units": 10,
            "endpoint_url": "https://img-sweden.backends.local",
        },
    });
    let (status, body, _) = send(&hub.app, json_request("POST", "/v1/admin/models", inside)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["backend"]["region"], "swedencentral");
}

#[tokio::test]
async fn service_identity_cannot_self_grant_admin_capability_over_rest() {
    let hub = hub().await;
    let agent = Uuid::new_v4();

    let (status, body, _) = send(
        &hub.app,
        json_request(
            "POST",
            "/v1/admin/grants",
            serde_json::json!({
                "actor": {"id": agent, "kind": "service_identity"},
                "principal": {"id": agent, "kind": "service_identity"},
                "scope": "backend/b1",
                "capability": "manage-deployments",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "HUB_UNAUTHORIZED");

    // The self-grantable capability goes through and lands in the ledger.
    let (status, _, _) = send(
        &hub.app,
        json_request(
            "POST",
            "/v1/admin/grants",
            serde_json::json!({
                "actor": {"id": agent, "kind": "service_identity"},
                "principal": {"id": agent, "kind": "service_identity"},
                "scope": "backend/b1",
                "capability": "invoke-own-resources",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body, _) = send(
        &hub.app,
        json_request(
            "POST",
            "/v1/admin/grants/check",
            serde_json::json!({
                "principal": {"id": agent, "kind": "service_identity"},
                "scope": "backend/b1",
                "capability": "invoke-own-resources",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
}
