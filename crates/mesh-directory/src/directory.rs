//! The pattern directory service.
//!
//! Wraps the replicated store with the directory's read/write discipline:
//! every write targets the local node's own key, reads tolerate replica lag
//! by escalating from `Local` to `Quorum`, and transient store failures are
//! retried a bounded number of times with a linear backoff equal to the
//! gossip time-frame.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use mesh_store::{Consistency, ReplicatedStore, StoreError};
use mesh_types::{
    DirectoryRecord, MatchResult, Message, NodeAddress, NodeConfig, ProcessingUnitDescriptor,
};

use crate::error::DirectoryError;

/// Retry and timing parameters for store interactions.
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    /// Delay between retries; approximates the store's replication latency.
    pub gossip_time_frame: Duration,
    /// Bounded attempts for each store operation.
    pub store_attempt_count: u32,
}

impl DirectorySettings {
    /// Extract the directory parameters from the node configuration.
    #[must_use]
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            gossip_time_frame: config.gossip_time_frame(),
            store_attempt_count: config.store_attempt_count.max(1),
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            gossip_time_frame: Duration::from_secs(2),
            store_attempt_count: 3,
        }
    }
}

/// One out-of-band trust adjustment.
#[derive(Debug, Clone)]
pub struct MistrustUpdate {
    /// Node owning the unit.
    pub node: NodeAddress,
    /// Unit to adjust.
    pub unit_id: String,
    /// New trust weight; clamped to at least 1.
    pub factor: u32,
}

/// The replicated pattern directory, as seen from one node.
///
/// Each node writes only its own record, keyed by its own address; peers'
/// records are read-only here. Matching scans every visible record.
pub struct PatternDirectory {
    store: Arc<dyn ReplicatedStore>,
    self_node: NodeAddress,
    settings: DirectorySettings,
}

impl PatternDirectory {
    /// Create the directory service for the local node.
    pub fn new(
        store: Arc<dyn ReplicatedStore>,
        self_node: NodeAddress,
        settings: DirectorySettings,
    ) -> Self {
        Self {
            store,
            self_node,
            settings,
        }
    }

    /// The local node's address, also its record key.
    #[must_use]
    pub fn self_node(&self) -> &NodeAddress {
        &self.self_node
    }

    /// Publish the local node's processing units.
    ///
    /// Rejects any unit advertising an empty pattern list before touching
    /// the store. The record is written with overwrite semantics at `Local`
    /// consistency; propagation to peers is eventual and is what the
    /// convergence watcher on their side waits for.
    pub async fn publish(
        &self,
        units: Vec<ProcessingUnitDescriptor>,
    ) -> Result<(), DirectoryError> {
        if let Some(unit) = units.iter().find(|unit| unit.patterns.is_empty()) {
            return Err(DirectoryError::EmptyPatternSet {
                unit_id: unit.unit_id.clone(),
            });
        }

        let record = DirectoryRecord {
            node: self.self_node.clone(),
            units,
        };
        let bytes = bincode::serialize(&record).map_err(|e| DirectoryError::Codec {
            node: self.self_node.to_string(),
            reason: e.to_string(),
        })?;

        self.with_retry("publish", || {
            let bytes = bytes.clone();
            async move {
                self.store
                    .write(self.self_node.as_str(), bytes, Consistency::Local)
                    .await
            }
        })
        .await?;
        debug!(node = %self.self_node, units = record.units.len(), "Directory record published");
        Ok(())
    }

    /// Match a message against every visible directory record.
    ///
    /// Returns one [`MatchResult`] per matching unit. Records that stay
    /// unreadable after local-then-quorum escalation are skipped with an
    /// error log, so a lagging replica degrades to a partial result instead
    /// of blocking dispatch.
    pub async fn match_message(&self, message: &Message) -> Result<Vec<MatchResult>, DirectoryError> {
        let structure = message.structure()?;

        let keys = self.list_keys_with_grace().await?;
        if keys.is_empty() {
            warn!("Directory has no records; message cannot be matched");
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for key in keys {
            let Some(record) = self.read_record(&key).await else {
                continue;
            };
            for unit in &record.units {
                let mut matching = unit.patterns.iter().filter(|p| p.matches(&structure));
                let Some(first) = matching.next() else {
                    continue;
                };
                if matching.next().is_some() {
                    warn!(
                        unit = %unit.path,
                        pattern = %first,
                        "Several patterns of one unit match; keeping the first in registration order"
                    );
                }
                results.push(MatchResult {
                    path: unit.path.clone(),
                    score: if first.is_secondary() {
                        0
                    } else {
                        first.conjunct_count()
                    },
                    mistrust_factor: unit.mistrust_factor.max(1),
                    secondary: first.is_secondary(),
                });
            }
        }
        debug!(matches = results.len(), "Directory match complete");
        Ok(results)
    }

    /// Remove a departed node's record.
    ///
    /// Idempotent: returns `true` when the record was deleted or already
    /// absent. Returns `false` only when the store kept failing; the record
    /// then lingers until overwritten or removed by a later cleanup.
    pub async fn remove_node(&self, node: &NodeAddress) -> bool {
        let outcome = self
            .with_retry("remove_node", || async move {
                self.store.delete(node.as_str(), Consistency::Quorum).await
            })
            .await;
        match outcome {
            Ok(existed) => {
                debug!(%node, existed, "Directory record removed");
                true
            }
            Err(e) => {
                error!(%node, error = %e, "Could not remove directory record");
                false
            }
        }
    }

    /// Apply out-of-band trust adjustments.
    ///
    /// Reads each affected node's record, patches the matching units in
    /// place and rewrites the record. Not on the message hot path.
    pub async fn update_mistrust_factors(
        &self,
        updates: &[MistrustUpdate],
    ) -> Result<(), DirectoryError> {
        let mut nodes: Vec<&NodeAddress> = updates.iter().map(|u| &u.node).collect();
        nodes.sort();
        nodes.dedup();

        for node in nodes {
            let Some(mut record) = self.read_record(node.as_str()).await else {
                warn!(%node, "No directory record to adjust trust for");
                continue;
            };
            let mut changed = false;
            for update in updates.iter().filter(|u| &u.node == node) {
                if let Some(unit) = record
                    .units
                    .iter_mut()
                    .find(|unit| unit.unit_id == update.unit_id)
                {
                    unit.mistrust_factor = update.factor.max(1);
                    changed = true;
                } else {
                    warn!(%node, unit = %update.unit_id, "No such unit in directory record");
                }
            }
            if !changed {
                continue;
            }
            let bytes = bincode::serialize(&record).map_err(|e| DirectoryError::Codec {
                node: node.to_string(),
                reason: e.to_string(),
            })?;
            self.with_retry("update_mistrust_factors", || {
                let bytes = bytes.clone();
                async move {
                    self.store
                        .write(node.as_str(), bytes, Consistency::Local)
                        .await
                }
            })
            .await?;
            debug!(%node, "Trust weights rewritten");
        }
        Ok(())
    }

    /// Whether a node's record is visible from here, escalating from a
    /// local read to a quorum read. Used by the convergence watcher.
    pub async fn record_visible(&self, node: &NodeAddress) -> bool {
        match self.store.read(node.as_str(), Consistency::Local).await {
            Ok(Some(_)) => true,
            Ok(None) | Err(_) => matches!(
                self.store.read(node.as_str(), Consistency::Quorum).await,
                Ok(Some(_))
            ),
        }
    }

    /// Enumerate record keys, waiting out propagation when none are
    /// visible yet: a freshly joined node's replica may briefly see an
    /// empty key set.
    async fn list_keys_with_grace(&self) -> Result<Vec<String>, DirectoryError> {
        let attempts = self.settings.store_attempt_count;
        let mut last: Option<StoreError> = None;
        for attempt in 1..=attempts {
            match self.store.list_keys().await {
                Ok(keys) if !keys.is_empty() => return Ok(keys),
                Ok(_) => {
                    debug!(attempt, "Directory key set empty; waiting a gossip time-frame");
                    last = None;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Directory key enumeration failed");
                    last = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.gossip_time_frame).await;
            }
        }
        match last {
            Some(source) => Err(DirectoryError::StoreUnavailable {
                operation: "list_keys",
                attempts,
                source,
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Read and decode one record, local first, quorum on a miss. Failures
    /// degrade to `None` with an error log.
    async fn read_record(&self, key: &str) -> Option<DirectoryRecord> {
        let bytes = match self.store.read(key, Consistency::Local).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) | Err(_) => {
                debug!(key, "Local replica lags; escalating to quorum read");
                let quorum = self
                    .with_retry("read_record", || async move {
                        self.store.read(key, Consistency::Quorum).await
                    })
                    .await;
                match quorum {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => return None,
                    Err(e) => {
                        error!(key, error = %e, "Directory record unreadable; skipping");
                        return None;
                    }
                }
            }
        };
        match bincode::deserialize(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                error!(key, error = %e, "Directory record undecodable; skipping");
                None
            }
        }
    }

    /// Run a store operation with bounded attempts and a linear backoff of
    /// one gossip time-frame between them.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, DirectoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.settings.store_attempt_count;
        let mut last = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(operation, attempt, error = %e, "Store operation failed");
                    last = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.gossip_time_frame).await;
            }
        }
        Err(DirectoryError::StoreUnavailable {
            operation,
            attempts,
            // The loop runs at least once, so a failure is always recorded.
            source: last.unwrap_or(StoreError::Unavailable("no attempt made".to_owned())),
        })
    }
}
