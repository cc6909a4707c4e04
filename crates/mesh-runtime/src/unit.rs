//! Processing units.
//!
//! A unit is one mailbox task. Deliveries are handled sequentially: the
//! first registered action whose pattern matches the message runs; units
//! with a single action skip the filter entirely. The unit owns a scoped
//! resource created on first use and released when the task exits, on
//! every exit path.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use mesh_types::{Message, Pattern, UnitPath};

use crate::handler::{LazyResource, ResourceCtor, ScriptEngine, UnitContext};
use crate::registry::Action;
use crate::transport::{Delivery, Receiver, TransportError};

/// Mailbox depth before senders are backpressured.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 128;

/// Everything needed to start one unit.
pub struct UnitSpec {
    /// Node-local unit identifier.
    pub unit_id: String,
    /// Cluster-unique delivery path.
    pub path: UnitPath,
    /// Actions in registration order.
    pub actions: Vec<(Pattern, Action)>,
    /// Scoped-resource constructor, if the unit has one.
    pub resource_ctor: Option<ResourceCtor>,
}

/// Spawner for processing units.
pub struct ProcessingUnit;

impl ProcessingUnit {
    /// Spawn the unit's mailbox task.
    pub fn spawn(spec: UnitSpec, script_engine: Option<Arc<dyn ScriptEngine>>) -> UnitHandle {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Receiver::new(spec.path.clone(), mailbox_tx);
        let path = spec.path.clone();

        let join = tokio::spawn(run_unit(spec, script_engine, mailbox_rx, shutdown_rx));
        debug!(%path, "Processing unit started");

        UnitHandle {
            path,
            receiver,
            shutdown_tx,
            join,
        }
    }
}

/// Handle to a running unit.
pub struct UnitHandle {
    path: UnitPath,
    receiver: Receiver,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl UnitHandle {
    /// The unit's delivery path.
    #[must_use]
    pub fn path(&self) -> &UnitPath {
        &self.path
    }

    /// The receiver used to deliver messages to this unit.
    #[must_use]
    pub fn receiver(&self) -> Receiver {
        self.receiver.clone()
    }

    /// Stop the unit and wait for its task to finish; the scoped resource
    /// is released before this returns.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
        debug!(path = %self.path, "Processing unit stopped");
    }
}

async fn run_unit(
    spec: UnitSpec,
    script_engine: Option<Arc<dyn ScriptEngine>>,
    mut mailbox: mpsc::Receiver<Delivery>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut resource = LazyResource::new(spec.path.clone(), spec.resource_ctor.clone());

    loop {
        let delivery = tokio::select! {
            _ = shutdown_rx.changed() => break,
            delivery = mailbox.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };
        handle_delivery(&spec, script_engine.as_deref(), &mut resource, delivery).await;
    }

    // Deterministic release on every exit path: shutdown or mailbox close.
    resource.release();
}

async fn handle_delivery(
    spec: &UnitSpec,
    script_engine: Option<&dyn ScriptEngine>,
    resource: &mut LazyResource,
    delivery: Delivery,
) {
    let Delivery {
        message,
        sender,
        reply,
    } = delivery;

    let action = if spec.actions.len() == 1 {
        // A single-action unit processes everything routed to it.
        Some(&spec.actions[0].1)
    } else {
        match message.structure() {
            Ok(structure) => spec
                .actions
                .iter()
                .find(|(pattern, _)| pattern.matches(&structure))
                .map(|(_, action)| action),
            Err(e) => {
                error!(path = %spec.path, error = %e, "Delivered message does not parse");
                return;
            }
        }
    };
    let Some(action) = action else {
        debug!(path = %spec.path, "No action matched the delivered message");
        return;
    };

    let response = match action {
        Action::Handler(handler) => {
            let mut ctx = UnitContext::new(&spec.path, sender.as_ref(), resource);
            match handler.handle(&message, &mut ctx).await {
                Ok(response) => response,
                Err(e) => {
                    error!(path = %spec.path, error = %e, "Handler failed");
                    None
                }
            }
        }
        Action::Script(source) => match script_engine {
            Some(engine) => match engine.run(source, &message).await {
                Ok(response) => response,
                Err(e) => {
                    error!(path = %spec.path, error = %e, "Script action failed");
                    None
                }
            },
            None => {
                // Guarded at system start; reaching this means the unit was
                // spawned outside a system with script actions unresolved.
                error!(path = %spec.path, "Script action without a script engine");
                None
            }
        },
    };

    match (reply, response) {
        (Some(slot), Some(response)) => {
            if slot.send(response).is_err() {
                debug!(path = %spec.path, "Asker went away before the response");
            }
        }
        (Some(_slot), None) => {
            // Dropping the slot tells the asker there is no response.
            debug!(path = %spec.path, "Request produced no response");
        }
        (None, Some(response)) => match sender {
            Some(sender) => {
                if let Err(e) = sender.reply(response).await {
                    match e {
                        TransportError::ReplyNotPermitted(_) => {
                            warn!(path = %spec.path, error = %e, "Secondary receiver tried to reply");
                        }
                        _ => warn!(path = %spec.path, error = %e, "Could not reply to sender"),
                    }
                }
            }
            None => debug!(path = %spec.path, "Response dropped; no reply channel"),
        },
        (None, None) => {}
    }
}
