//! Convergence watcher.
//!
//! Publishing a node's patterns is only half of startup: dispatch is
//! correct once the *peers'* records are visible from here. The watcher
//! tracks the cluster member set, polls the directory for every peer whose
//! record has not been observed yet, and answers readiness queries. It also
//! purges the directory record of any member that leaves the cluster.
//!
//! One watcher runs per node. The watch set is owned by the watcher task
//! and mutated only by its sequential event loop, so no locking is needed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mesh_types::{ClusterEvent, MemberStatus, NodeAddress, MESH_ROLE};

use crate::directory::PatternDirectory;
use crate::error::ReadinessError;
use crate::membership::ClusterMembership;

/// Watcher lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    /// No peers to observe.
    Idle,
    /// Waiting for at least one peer record to become visible.
    Watching,
    /// Every expected peer record has been observed.
    Ready,
}

/// The convergence watcher task.
pub struct ConvergenceWatcher {
    directory: Arc<PatternDirectory>,
    membership: Arc<dyn ClusterMembership>,
    gossip_time_frame: Duration,
}

impl ConvergenceWatcher {
    /// Spawn the watcher for the local node.
    ///
    /// The initial watch set is every currently-`Up` peer carrying the mesh
    /// role; the task then follows membership events until shut down.
    pub fn spawn(
        directory: Arc<PatternDirectory>,
        membership: Arc<dyn ClusterMembership>,
        gossip_time_frame: Duration,
    ) -> WatcherHandle {
        let watcher = Self {
            directory,
            membership,
            gossip_time_frame,
        };

        let self_address = watcher.membership.self_address();
        let events = watcher.membership.subscribe();
        let watch_set: BTreeSet<NodeAddress> = watcher
            .membership
            .current_members()
            .into_iter()
            .filter(|m| m.is_up() && m.has_role(MESH_ROLE) && m.address != self_address)
            .map(|m| m.address)
            .collect();

        let (ready_tx, ready_rx) = watch::channel(watch_set.is_empty());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let gossip_time_frame = watcher.gossip_time_frame;
        let join = tokio::spawn(watcher.run(watch_set, self_address, events, ready_tx, shutdown_rx));

        WatcherHandle {
            ready_rx,
            shutdown_tx,
            gossip_time_frame,
            join,
        }
    }

    async fn run(
        self,
        mut watch_set: BTreeSet<NodeAddress>,
        self_address: NodeAddress,
        mut events: broadcast::Receiver<ClusterEvent>,
        ready_tx: watch::Sender<bool>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut state = if watch_set.is_empty() {
            info!("No mesh peers to observe; directory considered converged");
            WatcherState::Idle
        } else {
            info!(peers = watch_set.len(), "Watching directory convergence");
            WatcherState::Watching
        };

        let mut poll = tokio::time::interval(self.gossip_time_frame);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Convergence watcher shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        self.on_event(event, &self_address, &mut watch_set, &mut state, &ready_tx);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Events were dropped; rebuild the watch set from a
                        // fresh snapshot. Re-observing an already-seen record
                        // costs one extra poll round and nothing else.
                        warn!(missed, "Membership events lagged; resynchronizing watch set");
                        watch_set = self
                            .membership
                            .current_members()
                            .into_iter()
                            .filter(|m| m.is_up() && m.has_role(MESH_ROLE) && m.address != self_address)
                            .map(|m| m.address)
                            .collect();
                        if !watch_set.is_empty() && state != WatcherState::Watching {
                            state = WatcherState::Watching;
                            let _ = ready_tx.send(false);
                        }
                        self.reconcile(&mut watch_set, &mut state, &ready_tx);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Membership event stream closed");
                        break;
                    }
                },
                // The poll timer only runs while peers are outstanding; an
                // empty watch set leaves the select waiting on events alone.
                _ = poll.tick(), if state == WatcherState::Watching => {
                    self.poll_watch_set(&mut watch_set).await;
                    self.reconcile(&mut watch_set, &mut state, &ready_tx);
                }
            }
        }
    }

    fn on_event(
        &self,
        event: ClusterEvent,
        self_address: &NodeAddress,
        watch_set: &mut BTreeSet<NodeAddress>,
        state: &mut WatcherState,
        ready_tx: &watch::Sender<bool>,
    ) {
        match event {
            ClusterEvent::MemberUp(node) => {
                if node.address == *self_address || !node.has_role(MESH_ROLE) {
                    return;
                }
                info!(node = %node.address, "Mesh member up; awaiting its directory record");
                watch_set.insert(node.address);
                if *state != WatcherState::Watching {
                    *state = WatcherState::Watching;
                    let _ = ready_tx.send(false);
                }
            }
            ClusterEvent::MemberRemoved {
                node,
                previous_status,
            } => {
                watch_set.remove(&node.address);
                // A member removed while still joining never published; only
                // nodes that reached Up can have left a record behind.
                if previous_status == MemberStatus::Up && node.address != *self_address {
                    let directory = Arc::clone(&self.directory);
                    let address = node.address.clone();
                    tokio::spawn(async move {
                        if directory.remove_node(&address).await {
                            info!(node = %address, "Directory record of departed node removed");
                        } else {
                            error!(node = %address, "Directory record of departed node could not be removed");
                        }
                    });
                }
                self.reconcile(watch_set, state, ready_tx);
            }
        }
    }

    /// Try to observe every outstanding peer record once.
    async fn poll_watch_set(&self, watch_set: &mut BTreeSet<NodeAddress>) {
        let pending: Vec<NodeAddress> = watch_set.iter().cloned().collect();
        for address in pending {
            if self.directory.record_visible(&address).await {
                debug!(node = %address, "Peer directory record observed");
                watch_set.remove(&address);
            }
        }
    }

    fn reconcile(
        &self,
        watch_set: &mut BTreeSet<NodeAddress>,
        state: &mut WatcherState,
        ready_tx: &watch::Sender<bool>,
    ) {
        if watch_set.is_empty() {
            if *state == WatcherState::Watching {
                info!("Directory converged; all peer records observed");
            }
            *state = WatcherState::Ready;
            let _ = ready_tx.send(true);
        }
    }
}

/// Handle to a running convergence watcher.
pub struct WatcherHandle {
    ready_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    gossip_time_frame: Duration,
    join: JoinHandle<()>,
}

impl WatcherHandle {
    /// Whether every expected peer record has been observed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Poll readiness with bounded attempts, one gossip time-frame apart.
    ///
    /// Fails with [`ReadinessError::Timeout`] when the directory never
    /// converges within the allotted attempts; callers treat that as fatal
    /// to node bring-up.
    pub async fn await_ready(&self, attempts: u32) -> Result<(), ReadinessError> {
        for attempt in 1..=attempts.max(1) {
            if self.is_ready() {
                return Ok(());
            }
            debug!(attempt, "Directory not yet converged");
            tokio::time::sleep(self.gossip_time_frame).await;
        }
        if self.is_ready() {
            return Ok(());
        }
        Err(ReadinessError::Timeout {
            attempts: attempts.max(1),
        })
    }

    /// Stop the watcher task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
