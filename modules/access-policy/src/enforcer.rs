//! Enforcer core: the grant ledger and the escalation guard.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::instrument;

use hub_sdk::{AccessGrant, Capability, HubError, Principal, ResourceScope};

/// One row of the append-only grant ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// A capability was granted.
    Granted(AccessGrant),
    /// A previously-granted capability was revoked.
    Revoked {
        principal: Principal,
        scope: ResourceScope,
        capability: Capability,
        revoked_at: DateTime<Utc>,
    },
}

impl LedgerEntry {
    fn matches(&self, principal: &Principal, scope: &ResourceScope, capability: Capability) -> bool {
        match self {
            Self::Granted(grant) => {
                grant.principal == *principal
                    && grant.scope == *scope
                    && grant.capability == capability
            }
            Self::Revoked {
                principal: p,
                scope: s,
                capability: c,
                ..
            } => p == principal && s == scope && *c == capability,
        }
    }
}

/// Decides grant vs deny for identities reaching hub resources directly.
pub struct PolicyEnforcer {
    ledger: RwLock<Vec<LedgerEntry>>,
}

impl Default for PolicyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEnforcer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(Vec::new()),
        }
    }

    /// Record that `grantee` may perform `capability` against `scope`.
    ///
    /// A `ServiceIdentity` actor may grant only self-grantable capabilities,
    /// and only to itself — automation can never widen its own (or a proxy
    /// identity's) access beyond what was marked safe for self-service.
    /// Granting an already-active capability converges without a duplicate
    /// ledger row.
    ///
    /// # Errors
    /// `Unauthorized` when the escalation guard rejects the actor.
    #[instrument(skip(self), fields(capability = %capability, scope = %scope))]
    pub fn grant(
        &self,
        actor: &Principal,
        grantee: Principal,
        scope: ResourceScope,
        capability: Capability,
    ) -> Result<(), HubError> {
        if actor.is_service_identity() {
            if grantee != *actor {
                return Err(HubError::unauthorized(
                    "service identities may not grant capabilities to other principals",
                ));
            }
            if !capability.is_self_grantable() {
                return Err(HubError::unauthorized(format!(
                    "capability {capability} is not self-grantable"
                )));
            }
        }

        let mut ledger = self.ledger.write();
        if Self::is_active(&ledger, &grantee, &scope, capability) {
            return Ok(());
        }

        ledger.push(LedgerEntry::Granted(AccessGrant {
            principal: grantee,
            scope,
            capability,
            granted_at: Utc::now(),
        }));

        tracing::info!(principal = %grantee.id, "Capability granted");
        Ok(())
    }

    /// Append a revocation for an active grant. Revoking something that is
    /// not active is a no-op, so revocation is idempotent.
    #[instrument(skip(self), fields(capability = %capability, scope = %scope))]
    pub fn revoke(&self, principal: &Principal, scope: &ResourceScope, capability: Capability) {
        let mut ledger = self.ledger.write();
        if !Self::is_active(&ledger, principal, scope, capability) {
            return;
        }

        ledger.push(LedgerEntry::Revoked {
            principal: *principal,
            scope: scope.clone(),
            capability,
            revoked_at: Utc::now(),
        });

        tracing::info!(principal = %principal.id, "Capability revoked");
    }

    /// Whether the principal currently holds the capability on the scope.
    #[must_use]
    pub fn check(
        &self,
        principal: &Principal,
        scope: &ResourceScope,
        capability: Capability,
    ) -> bool {
        Self::is_active(&self.ledger.read(), principal, scope, capability)
    }

    /// The full ledger, oldest first, for audit reconstruction.
    #[must_use]
    pub fn history(&self) -> Vec<LedgerEntry> {
        self.ledger.read().clone()
    }

    fn is_active(
        ledger: &[LedgerEntry],
        principal: &Principal,
        scope: &ResourceScope,
        capability: Capability,
    ) -> bool {
        // The last matching entry wins: grant-revoke-grant means active.
        ledger
            .iter()
            .rev()
            .find(|entry| entry.matches(principal, scope, capability))
            .is_some_and(|entry| matches!(entry, LedgerEntry::Granted(_)))
    }
}
