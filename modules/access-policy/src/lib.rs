//! Access policy enforcer.
//!
//! Grants are coarse named capabilities against resource scopes, recorded in
//! an append-only ledger. Nothing is edited in place: a revocation is its own
//! entry, the active set is a fold over the ledger, and the full history
//! stays available so "who had what access when" is always reconstructable.

mod enforcer;

pub use enforcer::{LedgerEntry, PolicyEnforcer};
