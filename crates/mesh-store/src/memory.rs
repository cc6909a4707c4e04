//! In-memory replicated store.
//!
//! One [`InMemoryReplicatedStore`] models the whole replicated store; each
//! node takes a [`ReplicaHandle`] and sees the store through its own local
//! replica. A write becomes visible to *other* replicas' `Local` reads only
//! after the configured gossip delay has elapsed; the writer always sees
//! its own writes, and `Quorum` reads always see committed state.
//!
//! Suitable for single-process operation and tests; distributed deployments
//! plug a real replicated store behind the same trait.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use mesh_types::NodeAddress;

use crate::store::{Consistency, ReplicatedStore, StoreError};

struct Entry {
    value: Vec<u8>,
    origin: NodeAddress,
    visible_at: Instant,
}

struct Shared {
    gossip_delay: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

/// The cluster-wide store state.
///
/// Clone-cheap: handles share state through an [`Arc`].
#[derive(Clone)]
pub struct InMemoryReplicatedStore {
    shared: Arc<Shared>,
}

impl InMemoryReplicatedStore {
    /// Create a store whose writes propagate instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::with_gossip_delay(Duration::ZERO)
    }

    /// Create a store whose writes reach other replicas only after `delay`.
    #[must_use]
    pub fn with_gossip_delay(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                gossip_delay: delay,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Take the replica handle through which `origin` sees the store.
    #[must_use]
    pub fn replica(&self, origin: NodeAddress) -> ReplicaHandle {
        ReplicaHandle {
            shared: Arc::clone(&self.shared),
            origin,
        }
    }

    /// Force propagation: make every committed write visible everywhere.
    pub fn flush(&self) {
        let now = Instant::now();
        if let Ok(mut entries) = self.shared.entries.write() {
            for entry in entries.values_mut() {
                entry.visible_at = now;
            }
        }
    }

    /// Number of committed entries, regardless of visibility.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.read().map_or(0, |entries| entries.len())
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryReplicatedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's view of the shared store.
pub struct ReplicaHandle {
    shared: Arc<Shared>,
    origin: NodeAddress,
}

impl ReplicaHandle {
    fn visible_locally(&self, entry: &Entry) -> bool {
        entry.origin == self.origin || Instant::now() >= entry.visible_at
    }
}

#[async_trait]
impl ReplicatedStore for ReplicaHandle {
    async fn write(
        &self,
        key: &str,
        value: Vec<u8>,
        consistency: Consistency,
    ) -> Result<(), StoreError> {
        let visible_at = match consistency {
            // A quorum write is acknowledged by all replicas before it
            // returns, so it is immediately visible everywhere.
            Consistency::Quorum => Instant::now(),
            Consistency::Local => Instant::now() + self.shared.gossip_delay,
        };
        let mut entries = self
            .shared
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                origin: self.origin.clone(),
                visible_at,
            },
        );
        debug!(key, origin = %self.origin, ?consistency, "Store write committed");
        Ok(())
    }

    async fn read(
        &self,
        key: &str,
        consistency: Consistency,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let value = entries.get(key).and_then(|entry| match consistency {
            Consistency::Quorum => Some(entry.value.clone()),
            Consistency::Local => self.visible_locally(entry).then(|| entry.value.clone()),
        });
        Ok(value)
    }

    async fn delete(&self, key: &str, _consistency: Consistency) -> Result<bool, StoreError> {
        let mut entries = self
            .shared
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let existed = entries.remove(key).is_some();
        debug!(key, origin = %self.origin, existed, "Store delete");
        Ok(existed)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| self.visible_locally(entry))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
