//! The replicated store driven port.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from store operations.
///
/// Transient by definition: callers retry with bounded attempts before
/// surfacing the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-call consistency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Answer from the local replica; fast, possibly stale.
    Local,
    /// Require agreement across replicas; slow, never stale.
    Quorum,
}

/// Abstract interface to the replicated key-value store.
///
/// The host provides a concrete implementation; the mesh ships
/// [`crate::InMemoryReplicatedStore`] for single-process operation. All
/// operations are non-blocking round-trips.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the directory, the watcher and
/// the dispatcher share one handle across tasks.
#[async_trait]
pub trait ReplicatedStore: Send + Sync {
    /// Write a value under a key.
    async fn write(
        &self,
        key: &str,
        value: Vec<u8>,
        consistency: Consistency,
    ) -> Result<(), StoreError>;

    /// Read the value under a key.
    ///
    /// `Ok(None)` means the key is not visible at the requested consistency
    /// level; at `Local` that can mean "not propagated yet".
    async fn read(&self, key: &str, consistency: Consistency)
        -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete the value under a key.
    ///
    /// Returns `false` when the key was already absent; deletion is
    /// idempotent.
    async fn delete(&self, key: &str, consistency: Consistency) -> Result<bool, StoreError>;

    /// Enumerate the keys visible to this replica.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}
