//! Deterministic name allocation for hub tenants and resources.
//!
//! Every spoke gets a short, collision-resistant suffix derived from its
//! identity context. The context is an explicit input: nothing here reads
//! ambient state, so re-running allocation for the same context always
//! converges on the same name.

use std::fmt;

use sha2::{Digest, Sha256};

/// Alphabet for the derived suffix: lowercase base-36.
const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the derived suffix in characters.
const SUFFIX_LEN: usize = 6;

/// Stable identity seed for a tenant.
///
/// `scope` is the platform-level identity the tenant lives under (the
/// original deployment derived this from the subscription/resource-group
/// pair); `name` is the tenant's own declared name within that scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    pub scope: String,
    pub name: String,
}

impl TenantContext {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

/// A derived, collision-resistant name suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniqueName(String);

impl UniqueName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the unique suffix for a tenant context.
///
/// SHA-256 over the context fields (with an unambiguous separator), then the
/// first 8 digest bytes re-encoded as 6 lowercase base-36 characters. The
/// truncated space holds 36^6 ≈ 2.2 × 10^9 names; by the birthday bound the
/// collision probability stays below 1% until roughly 6,600 distinct
/// contexts, and below 10^-5 for hubs of a few hundred spokes. No retry
/// logic exists for the residual case.
///
/// Deterministic and side-effect free: the same context always yields the
/// same name, so re-deployment cannot mint duplicates.
#[must_use]
pub fn allocate(ctx: &TenantContext) -> UniqueName {
    let mut hasher = Sha256::new();
    hasher.update(ctx.scope.as_bytes());
    // Unit separator keeps ("ab", "c") and ("a", "bc") distinct.
    hasher.update([0x1f]);
    hasher.update(ctx.name.as_bytes());
    let digest = hasher.finalize();

    let mut acc = u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);

    let mut suffix = [0u8; SUFFIX_LEN];
    for slot in &mut suffix {
        *slot = ALPHABET[(acc % 36) as usize];
        acc /= 36;
    }

    UniqueName(String::from_utf8_lossy(&suffix).into_owned())
}

/// Compose a full resource name from a prefix and a derived suffix,
/// e.g. `spoke-3kf92a`.
#[must_use]
pub fn resource_name(prefix: &str, suffix: &UniqueName) -> String {
    format!("{prefix}-{suffix}")
}
