//! HTTP dispatcher: forwards prepared requests to physical deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::instrument;

use hub_sdk::{BackendDispatcher, BackendRequest, HubError, InvokeResponse, RoutingRule};

/// Dispatches over HTTP with per-request timeouts.
///
/// Upstream responses come back unmodified: non-5xx statuses (including
/// 4xx) are the caller's to interpret. 5xx and timeouts surface as
/// `BackendError`; retrying is a client concern.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    /// Create a dispatcher with a pooled client.
    ///
    /// # Errors
    /// `Internal` when the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, HubError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| HubError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    }
}

#[async_trait]
impl BackendDispatcher for HttpDispatcher {
    #[instrument(skip(self, rule, request), fields(
        backend = %rule.backend.backend_id,
        endpoint = %rule.backend.endpoint_url
    ))]
    async fn dispatch(
        &self,
        rule: &RoutingRule,
        request: BackendRequest,
    ) -> Result<InvokeResponse, HubError> {
        let start = std::time::Instant::now();

        let query: Vec<(&String, &String)> = request.query.iter().collect();
        let mut builder = self
            .client
            .post(&rule.backend.endpoint_url)
            .timeout(request.timeout)
            .query(&query)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", request.credential.expose_secret()),
            );

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Timeouts and connect failures alike carry no upstream status.
        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|_| HubError::backend_error(None, None))?;

        let status_code = response.status().as_u16();
        let retry_after_sec = Self::extract_retry_after(response.headers());

        if response.status().is_server_error() {
            return Err(HubError::backend_error(Some(status_code), retry_after_sec));
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_owned());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|_| HubError::backend_error(None, None))?;

        // Duration in ms is always small enough for u64 in practice
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            status_code,
            duration_ms,
            body_size = body.len(),
            "Backend request completed"
        );

        Ok(InvokeResponse {
            status_code,
            headers,
            body,
            duration_ms,
            backend_id: rule.backend.backend_id.clone(),
        })
    }
}
