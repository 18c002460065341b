//! Broker core: connection lifecycle and credential authentication.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use tracing::instrument;

use hub_sdk::{
    Connection, ConnectionAuthenticator, ConnectionId, ConnectionScope, HubError, ModelName,
    TenantId,
};
use model_registry::ModelRegistry;

/// Wire prefix for issued auth material, so leaked values are recognizable
/// in logs and scanners.
const TOKEN_PREFIX: &str = "mh_";

/// Entropy of the random part.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct ConnectionRecord {
    id: ConnectionId,
    owner: TenantId,
    gateway_target: String,
    model_allow_list: Vec<ModelName>,
    /// Hex SHA-256 of the live auth material. The plaintext is returned to
    /// the caller exactly once per issue/rotate and never stored.
    token_digest: String,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    fn scope(&self) -> ConnectionScope {
        ConnectionScope {
            id: self.id,
            owner: self.owner.clone(),
            model_allow_list: self.model_allow_list.clone(),
        }
    }
}

/// Issues scoped, revocable connections binding a tenant to the gateway.
///
/// `authenticate` is lock-free on the digest index; issue/rotate/revoke are
/// infrequent and serialize on one coarse lock.
pub struct ConnectionBroker {
    registry: Arc<ModelRegistry>,
    connections: DashMap<ConnectionId, ConnectionRecord>,
    /// token digest -> connection. Rotation and revocation drop the entry,
    /// which is what makes old material dead immediately.
    token_index: DashMap<String, ConnectionId>,
    mutate_lock: Mutex<()>,
}

impl ConnectionBroker {
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
            token_index: DashMap::new(),
            mutate_lock: Mutex::new(()),
        }
    }

    /// Issue a fresh connection for `tenant_id` scoped to `requested`.
    ///
    /// Every requested model is validated against one registry snapshot
    /// before any state is written: an unknown model fails the whole call
    /// and persists nothing. Duplicate names collapse to the first
    /// occurrence; the surviving order is kept for display only.
    ///
    /// # Errors
    /// `UnknownModel` when any requested model is not registered.
    #[instrument(skip(self, requested), fields(tenant = %tenant_id))]
    pub fn issue(
        &self,
        tenant_id: &TenantId,
        requested: &[ModelName],
        target: &str,
    ) -> Result<Connection, HubError> {
        if let Some(unknown) = self.registry.first_unknown(requested) {
            return Err(HubError::unknown_model(unknown.as_str()));
        }

        let mut allow_list: Vec<ModelName> = Vec::with_capacity(requested.len());
        for model in requested {
            if !allow_list.contains(model) {
                allow_list.push(model.clone());
            }
        }

        let _guard = self.mutate_lock.lock();

        let token = mint_token();
        let digest = digest_of(&token);
        let record = ConnectionRecord {
            id: ConnectionId::generate(),
            owner: tenant_id.clone(),
            gateway_target: target.to_owned(),
            model_allow_list: allow_list,
            token_digest: digest.clone(),
            revoked: false,
            created_at: Utc::now(),
        };

        let connection = Connection {
            id: record.id,
            owner: record.owner.clone(),
            gateway_target: record.gateway_target.clone(),
            auth_material: SecretString::from(token),
            model_allow_list: record.model_allow_list.clone(),
            created_at: record.created_at,
        };

        self.token_index.insert(digest, record.id);
        self.connections.insert(record.id, record);

        tracing::info!(connection = %connection.id, models = connection.model_allow_list.len(), "Connection issued");
        Ok(connection)
    }

    /// Regenerate auth material, preserving identity and allow-list.
    ///
    /// Cutover is immediate: the old material stops authenticating the
    /// moment this returns, with no grace overlap. A grace window would
    /// require a second live digest per connection and complicate the
    /// ordering against revocation.
    ///
    /// # Errors
    /// `ConnectionNotFound` when the id is unknown or already revoked
    /// (revoked connections are tombstones).
    #[instrument(skip(self), fields(connection = %id))]
    pub fn rotate(&self, id: ConnectionId) -> Result<Connection, HubError> {
        let _guard = self.mutate_lock.lock();

        let mut record = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::ConnectionNotFound { id })?;
        if record.revoked {
            return Err(HubError::ConnectionNotFound { id });
        }

        let token = mint_token();
        let digest = digest_of(&token);
        self.token_index.remove(&record.token_digest);
        self.token_index.insert(digest.clone(), id);
        record.token_digest = digest;

        tracing::info!(connection = %id, "Connection auth material rotated");
        Ok(Connection {
            id: record.id,
            owner: record.owner.clone(),
            gateway_target: record.gateway_target.clone(),
            auth_material: SecretString::from(token),
            model_allow_list: record.model_allow_list.clone(),
            created_at: record.created_at,
        })
    }

    /// Make the connection permanently unusable. Idempotent: revoking an
    /// already-revoked or unknown connection does nothing.
    #[instrument(skip(self), fields(connection = %id))]
    pub fn revoke(&self, id: ConnectionId) {
        let _guard = self.mutate_lock.lock();

        if let Some(mut record) = self.connections.get_mut(&id) {
            if !record.revoked {
                record.revoked = true;
                self.token_index.remove(&record.token_digest);
                tracing::info!(connection = %id, "Connection revoked");
            }
        }
    }

    /// The authenticated view of a connection, for the control plane.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionScope> {
        self.connections
            .get(&id)
            .filter(|record| !record.revoked)
            .map(|record| record.scope())
    }

    /// All live connections, for the control-plane listing.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionScope> {
        let mut scopes: Vec<_> = self
            .connections
            .iter()
            .filter(|record| !record.revoked)
            .map(|record| record.scope())
            .collect();
        scopes.sort_by(|a, b| a.id.as_uuid().cmp(&b.id.as_uuid()));
        scopes
    }
}

#[async_trait]
impl ConnectionAuthenticator for ConnectionBroker {
    async fn authenticate(&self, presented: &str) -> Result<ConnectionScope, HubError> {
        let digest = digest_of(presented);
        let id = self
            .token_index
            .get(&digest)
            .map(|entry| *entry.value())
            .ok_or_else(|| HubError::unauthenticated("unknown or revoked credential"))?;

        let record = self
            .connections
            .get(&id)
            .ok_or_else(|| HubError::unauthenticated("unknown or revoked credential"))?;
        if record.revoked {
            // Index removal races are possible between the two lookups.
            return Err(HubError::unauthenticated("unknown or revoked credential"));
        }

        Ok(record.scope())
    }
}

fn mint_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

fn digest_of(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_sdk::{BackendId, LogicalModel, ModelFormat, PhysicalDeployment, Region};
    use secrecy::ExposeSecret;

    // Tests are the one place issued material is exposed back out.
    fn exposed(conn: &Connection) -> String {
        conn.auth_material.expose_secret().to_owned()
    }

    fn registry_with(models: &[&str]) -> Arc<ModelRegistry> {
        let registry = Arc::new(ModelRegistry::new());
        for name in models {
            registry
                .register(
                    LogicalModel {
                        name: ModelName::new(*name),
                        format: ModelFormat::new("openai"),
                        version: "1".into(),
                        allowed_regions: None,
                    },
                    PhysicalDeployment {
                        backend_id: BackendId::new(format!("{name}-backend")),
                        region: Region::new("swedencentral"),
                        capacity_units: 10,
                        endpoint_url: format!("https://{name}.backends.local"),
                    },
                    vec![],
                )
                .expect("register");
        }
        registry
    }

    fn tenant() -> TenantId {
        TenantId::new("spoke-3kf92a")
    }

    const TARGET: &str = "https://hub.local/v1";

    #[tokio::test]
    async fn issue_then_authenticate() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let conn = broker
            .issue(&tenant(), &[ModelName::new("gpt-4.1-mini")], TARGET)
            .expect("issue");

        assert!(conn.auth_material.expose_secret().starts_with(TOKEN_PREFIX));

        let scope = broker
            .authenticate(&exposed(&conn))
            .await
            .expect("authenticate");
        assert_eq!(scope.id, conn.id);
        assert_eq!(scope.owner, tenant());
        assert!(scope.allows(&ModelName::new("gpt-4.1-mini")));
    }

    #[tokio::test]
    async fn issue_unknown_model_persists_nothing() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let err = broker
            .issue(
                &tenant(),
                &[ModelName::new("gpt-4.1-mini"), ModelName::new("gpt-5")],
                TARGET,
            )
            .expect_err("unknown model");

        assert_eq!(
            err,
            HubError::UnknownModel {
                model: "gpt-5".into()
            }
        );
        assert!(broker.list().is_empty(), "no partial state");
    }

    #[test]
    fn duplicate_requests_collapse() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let conn = broker
            .issue(
                &tenant(),
                &[
                    ModelName::new("gpt-4.1-mini"),
                    ModelName::new("gpt-4.1-mini"),
                ],
                TARGET,
            )
            .expect("issue");
        assert_eq!(conn.model_allow_list.len(), 1);
    }

    #[tokio::test]
    async fn rotate_preserves_identity_and_cuts_over() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let conn = broker
            .issue(&tenant(), &[ModelName::new("gpt-4.1-mini")], TARGET)
            .expect("issue");
        let old_token = exposed(&conn);

        let rotated = broker.rotate(conn.id).expect("rotate");
        assert_eq!(rotated.id, conn.id);
        assert_eq!(rotated.model_allow_list, conn.model_allow_list);
        assert_ne!(exposed(&rotated), old_token);

        let err = broker.authenticate(&old_token).await.expect_err("old material");
        assert!(matches!(err, HubError::Unauthenticated { .. }));
        broker
            .authenticate(&exposed(&rotated))
            .await
            .expect("new material");
    }

    #[test]
    fn rotate_unknown_connection_fails() {
        let broker = ConnectionBroker::new(registry_with(&[]));
        let err = broker
            .rotate(ConnectionId::generate())
            .expect_err("unknown id");
        assert!(matches!(err, HubError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn revoke_is_terminal_and_idempotent() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let conn = broker
            .issue(&tenant(), &[ModelName::new("gpt-4.1-mini")], TARGET)
            .expect("issue");
        let token = exposed(&conn);

        broker.revoke(conn.id);
        let err = broker.authenticate(&token).await.expect_err("revoked");
        assert!(matches!(err, HubError::Unauthenticated { .. }));

        // Revoking twice is not an error.
        broker.revoke(conn.id);

        // Rotation of a tombstone fails.
        let err = broker.rotate(conn.id).expect_err("revoked tombstone");
        assert!(matches!(err, HubError::ConnectionNotFound { .. }));
        assert!(broker.get(conn.id).is_none());
    }

    #[tokio::test]
    async fn tampered_material_is_rejected() {
        let broker = ConnectionBroker::new(registry_with(&["gpt-4.1-mini"]));
        let conn = broker
            .issue(&tenant(), &[ModelName::new("gpt-4.1-mini")], TARGET)
            .expect("issue");

        let mut token = exposed(&conn);
        token.push('x');
        let err = broker.authenticate(&token).await.expect_err("tampered");
        assert!(matches!(err, HubError::Unauthenticated { .. }));
    }
}
