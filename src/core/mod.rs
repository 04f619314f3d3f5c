//! In-memory authoritative store and synchronization engine.

/// Helper index aliases.
pub mod indices;
/// Authoritative progress store and ledger.
pub mod store;
/// Cross-medium synchronization algorithm.
pub mod sync;
