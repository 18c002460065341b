//! Static backend credential source.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use hub_sdk::{BackendCredentialSource, BackendId, HubError, RoutingRule};

/// Hub-held backend credentials, keyed by backend.
///
/// These are the secrets the gateway attaches after stripping whatever the
/// caller sent. Populated from server configuration; a real deployment
/// would swap this for a managed-identity exchange behind the same port.
pub struct StaticCredentialSource {
    credentials: HashMap<BackendId, SecretString>,
}

impl StaticCredentialSource {
    #[must_use]
    pub fn new(credentials: HashMap<BackendId, SecretString>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl BackendCredentialSource for StaticCredentialSource {
    async fn credential_for(&self, rule: &RoutingRule) -> Result<SecretString, HubError> {
        self.credentials
            .get(&rule.backend.backend_id)
            .cloned()
            .ok_or_else(|| HubError::backend_unavailable(rule.model.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use secrecy::ExposeSecret;

    use hub_sdk::{ModelName, PhysicalDeployment, Region};

    fn rule(backend_id: &str) -> RoutingRule {
        RoutingRule {
            model: ModelName::new("gpt-4.1-mini"),
            backend: PhysicalDeployment {
                backend_id: BackendId::new(backend_id),
                region: Region::new("swedencentral"),
                capacity_units: 50,
                endpoint_url: "https://b1.backends.local".into(),
            },
            policy: vec![],
        }
    }

    #[tokio::test]
    async fn returns_the_backend_secret() {
        let source = StaticCredentialSource::new(HashMap::from([(
            BackendId::new("b1"),
            SecretString::from("s3cret"),
        )]));

        let secret = source.credential_for(&rule("b1")).await.expect("held");
        assert_eq!(secret.expose_secret(), "s3cret");
    }

    #[tokio::test]
    async fn missing_backend_is_unavailable() {
        let source = StaticCredentialSource::new(HashMap::new());
        let err = source.credential_for(&rule("b1")).await.expect_err("absent");
        assert!(matches!(err, HubError::BackendUnavailable { .. }));
    }
}
