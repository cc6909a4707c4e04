//! The message system: dispatch and lifecycle.
//!
//! One [`MessageSystem`] instance runs per node, owned by the composition
//! root; there is no process-global instance. Starting the system spawns
//! the node's processing units from the registration table, publishes their
//! patterns to the directory, and gates readiness on the convergence
//! watcher: the node is up only once its peers' patterns are visible from
//! here, because dispatch correctness depends on exactly that.
//!
//! Dispatch resolves receivers per message. The primary receiver is the
//! best-scoring non-secondary match, with ties broken by mistrust-weighted
//! random choice; every secondary match receives a copy with a read-only
//! sender and is never the target of a request/response exchange.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use mesh_directory::{
    selector, ClusterMembership, ConvergenceWatcher, DirectoryError, DirectorySettings,
    PatternDirectory, ReadinessError, WatcherHandle,
};
use mesh_store::ReplicatedStore;
use mesh_types::{MatchResult, Message, NodeConfig, ProcessingUnitDescriptor, UnitPath};

use crate::handler::ScriptEngine;
use crate::registry::PatternActionsRegistry;
use crate::transport::{LocalTransport, Sender, TransportError};
use crate::unit::{ProcessingUnit, UnitHandle, UnitSpec};

/// Errors from system startup.
#[derive(Debug, Error)]
pub enum StartError {
    /// The registry contains script actions but no interpreter was wired.
    #[error("registry contains script actions but no script engine is configured")]
    MissingScriptEngine,

    /// Publishing the node's patterns failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The directory never converged; the node cannot dispatch correctly.
    #[error(transparent)]
    NotReady(#[from] ReadinessError),
}

/// Errors from dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No published pattern matched the message.
    #[error("no receiver found for message")]
    NoReceiver,

    /// The primary receiver did not answer in time.
    #[error("ask timed out after {0:?}")]
    AskTimeout(Duration),

    /// The directory could not be consulted.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Delivery to the primary receiver failed.
    #[error(transparent)]
    Delivery(TransportError),
}

/// Select the primary receiver among match results.
///
/// Secondary candidates never qualify. Among the rest, the group with the
/// highest matching score wins; a single member is returned directly, and
/// ties are broken at random, weighted inversely by each candidate's
/// mistrust factor.
pub fn select_primary(candidates: &[MatchResult]) -> Option<&MatchResult> {
    let primaries: Vec<&MatchResult> = candidates.iter().filter(|c| !c.secondary).collect();
    let top_score = primaries.iter().map(|c| c.score).max()?;
    let top: Vec<&MatchResult> = primaries
        .into_iter()
        .filter(|c| c.score == top_score)
        .collect();

    if top.len() == 1 {
        return Some(top[0]);
    }

    warn!(
        score = top_score,
        tied = top.len(),
        "Several receivers share the highest matching score; picking one by trust weight"
    );
    let factors: Vec<u32> = top.iter().map(|c| c.mistrust_factor.max(1)).collect();
    match selector::select_index(&factors) {
        Ok(index) => {
            let chosen = top[index];
            debug!(path = %chosen.path, mistrust = chosen.mistrust_factor, "Receiver chosen at random");
            Some(chosen)
        }
        Err(e) => {
            // Factors are clamped to >= 1 above, so this cannot trip; fall
            // back to the first candidate rather than dropping the message.
            error!(error = %e, "Weighted selection failed");
            Some(top[0])
        }
    }
}

/// The per-node message system.
pub struct MessageSystem {
    config: NodeConfig,
    directory: Arc<PatternDirectory>,
    transport: Arc<LocalTransport>,
    membership: Arc<dyn ClusterMembership>,
    script_engine: Option<Arc<dyn ScriptEngine>>,
    units: Mutex<Vec<UnitHandle>>,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl MessageSystem {
    /// Wire a message system from its collaborators.
    ///
    /// Nothing runs until [`MessageSystem::start`] is called.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn ReplicatedStore>,
        transport: Arc<LocalTransport>,
        membership: Arc<dyn ClusterMembership>,
        script_engine: Option<Arc<dyn ScriptEngine>>,
    ) -> Self {
        let settings = DirectorySettings::from_config(&config);
        let directory = Arc::new(PatternDirectory::new(
            store,
            membership.self_address(),
            settings,
        ));
        Self {
            config,
            directory,
            transport,
            membership,
            script_engine,
            units: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// The pattern directory of this node.
    #[must_use]
    pub fn directory(&self) -> &Arc<PatternDirectory> {
        &self.directory
    }

    /// Start the system: spawn units, publish patterns, wait for the
    /// directory to converge.
    pub async fn start(&self, registry: PatternActionsRegistry) -> Result<(), StartError> {
        info!(node = %self.config.node_id, "Starting the message system");

        if registry.has_script_actions() && self.script_engine.is_none() {
            return Err(StartError::MissingScriptEngine);
        }

        let mut spawned: Vec<UnitHandle> = Vec::new();
        let mut descriptors: Vec<ProcessingUnitDescriptor> = Vec::new();
        for (unit_id, entries) in registry.by_unit() {
            let path = UnitPath::new(&self.config.node_id, &unit_id);
            let patterns = entries.iter().map(|e| e.pattern.clone()).collect();
            let spec = UnitSpec {
                unit_id: unit_id.clone(),
                path: path.clone(),
                actions: entries
                    .into_iter()
                    .map(|e| (e.pattern, e.action))
                    .collect(),
                resource_ctor: registry.unit_resource(&unit_id),
            };
            let handle = ProcessingUnit::spawn(spec, self.script_engine.clone());
            self.transport.register(handle.receiver());
            debug!(%path, "Processing unit created");
            spawned.push(handle);
            descriptors.push(ProcessingUnitDescriptor {
                unit_id: unit_id.clone(),
                path,
                patterns,
                mistrust_factor: self.config.mistrust_factor(&unit_id),
            });
        }

        if let Err(e) = self.directory.publish(descriptors).await {
            self.stop_units(spawned).await;
            return Err(e.into());
        }
        debug!("Processing units registered with the directory");

        // Give our own publication one gossip round before expecting peers
        // to be observable, then gate on convergence.
        tokio::time::sleep(self.config.gossip_time_frame()).await;
        let watcher = ConvergenceWatcher::spawn(
            Arc::clone(&self.directory),
            Arc::clone(&self.membership),
            self.config.gossip_time_frame(),
        );
        if let Err(e) = watcher.await_ready(self.config.gossip_sync_attempt_count).await {
            error!(error = %e, "Message system did not get ready within the allocated time frame");
            watcher.shutdown().await;
            self.stop_units(spawned).await;
            return Err(e.into());
        }

        if let Ok(mut units) = self.units.lock() {
            units.extend(spawned);
        }
        if let Ok(mut slot) = self.watcher.lock() {
            *slot = Some(watcher);
        }
        info!(node = %self.config.node_id, "Message system started and ready");
        Ok(())
    }

    /// Whether the directory has converged from this node's point of view.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.watcher
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(WatcherHandle::is_ready))
            .unwrap_or(false)
    }

    /// Fire-and-forget dispatch.
    ///
    /// The message goes once to the selected primary receiver and, as a
    /// copy with a read-only sender, to every secondary receiver. Fails
    /// only when nothing matches at all; a missing primary is a logged
    /// partial success with secondaries still notified.
    pub async fn send(&self, message: Message, sender: Option<Sender>) -> Result<(), DispatchError> {
        let candidates = self.directory.match_message(&message).await?;
        if candidates.is_empty() {
            error!(%message, "Cannot find any receiver of message");
            return Err(DispatchError::NoReceiver);
        }

        match select_primary(&candidates) {
            Some(primary) => {
                debug!(path = %primary.path, score = primary.score, "Primary receiver selected");
                if let Err(e) = self
                    .transport
                    .tell(&primary.path, message.clone(), sender.clone())
                    .await
                {
                    // A stale directory record can outlive its unit; the
                    // failed delivery is logged, not surfaced per message.
                    warn!(path = %primary.path, error = %e, "Primary delivery failed");
                }
            }
            None => warn!(%message, "No primary receiver found for message"),
        }

        self.notify_secondaries(&candidates, &message, sender.as_ref())
            .await;
        Ok(())
    }

    /// Request/response dispatch.
    ///
    /// Asks the selected primary once, suspending until its response or
    /// the timeout. Secondary receivers get their copies fire-and-forget
    /// and are never asked. `Ok(None)` means secondaries exist but no
    /// primary does.
    pub async fn ask(
        &self,
        message: Message,
        sender: Option<Sender>,
        timeout: Option<Duration>,
    ) -> Result<Option<Message>, DispatchError> {
        let timeout = timeout.unwrap_or_else(|| self.config.ask_timeout());
        let candidates = self.directory.match_message(&message).await?;
        if candidates.is_empty() {
            error!(%message, "Cannot find any receiver of message");
            return Err(DispatchError::NoReceiver);
        }

        self.notify_secondaries(&candidates, &message, sender.as_ref())
            .await;

        let Some(primary) = select_primary(&candidates) else {
            warn!(%message, "No primary receiver found for message");
            return Ok(None);
        };
        debug!(path = %primary.path, score = primary.score, "Primary receiver selected");
        match self.transport.ask(&primary.path, message, timeout).await {
            Ok(response) => Ok(Some(response)),
            Err(TransportError::AskTimeout(t)) => Err(DispatchError::AskTimeout(t)),
            Err(e) => Err(DispatchError::Delivery(e)),
        }
    }

    async fn notify_secondaries(
        &self,
        candidates: &[MatchResult],
        message: &Message,
        sender: Option<&Sender>,
    ) {
        let read_only = sender.map(Sender::read_only);
        for secondary in candidates.iter().filter(|c| c.secondary) {
            debug!(path = %secondary.path, "Notifying secondary receiver");
            if let Err(e) = self
                .transport
                .tell(&secondary.path, message.clone(), read_only.clone())
                .await
            {
                warn!(path = %secondary.path, error = %e, "Secondary delivery failed");
            }
        }
    }

    /// Stop the watcher and every unit; scoped resources are released
    /// before this returns.
    pub async fn shutdown(&self) {
        let watcher = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }
        let units = self
            .units
            .lock()
            .map_or_else(|_| Vec::new(), |mut units| units.drain(..).collect());
        self.stop_units(units).await;
        info!(node = %self.config.node_id, "Message system stopped");
    }

    async fn stop_units(&self, units: Vec<UnitHandle>) {
        for unit in units {
            self.transport.deregister(unit.path());
            unit.stop().await;
        }
    }
}
