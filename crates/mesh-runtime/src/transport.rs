//! In-process message transport.
//!
//! [`Receiver`] is the capability to deliver messages to one unit's
//! mailbox; [`Sender`] is the reply capability handed to handlers, which
//! can be downgraded to read-only for secondary deliveries. The
//! [`LocalTransport`] resolves unit paths to receivers within the process;
//! a distributed deployment substitutes a networked resolver behind the
//! same calls.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use mesh_types::{Message, UnitPath};

/// Errors from message delivery.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No unit is registered under the path.
    #[error("no unit registered at {0}")]
    UnknownPath(UnitPath),

    /// The unit's mailbox is gone; the unit has stopped.
    #[error("mailbox closed for {0}")]
    MailboxClosed(UnitPath),

    /// A request/response exchange did not answer in time.
    #[error("ask timed out after {0:?}")]
    AskTimeout(Duration),

    /// The unit dropped the reply slot without answering.
    #[error("ask to {0} was dropped without a response")]
    ReplyDropped(UnitPath),

    /// A read-only sender capability was asked to reply.
    #[error("replying to {0} is not permitted through a read-only sender")]
    ReplyNotPermitted(UnitPath),
}

/// One message as delivered to a unit's mailbox.
pub struct Delivery {
    /// The message itself.
    pub message: Message,
    /// Reply capability of the originator, if any.
    pub sender: Option<Sender>,
    /// Response slot for request/response exchanges.
    pub(crate) reply: Option<oneshot::Sender<Message>>,
}

/// Capability to deliver messages to one unit.
#[derive(Clone)]
pub struct Receiver {
    path: UnitPath,
    mailbox: mpsc::Sender<Delivery>,
}

impl Receiver {
    pub(crate) fn new(path: UnitPath, mailbox: mpsc::Sender<Delivery>) -> Self {
        Self { path, mailbox }
    }

    /// The unit path this receiver delivers to.
    #[must_use]
    pub fn path(&self) -> &UnitPath {
        &self.path
    }

    /// Fire-and-forget delivery.
    pub async fn tell(&self, message: Message, sender: Option<Sender>) -> Result<(), TransportError> {
        self.mailbox
            .send(Delivery {
                message,
                sender,
                reply: None,
            })
            .await
            .map_err(|_| TransportError::MailboxClosed(self.path.clone()))
    }

    /// Request/response delivery; suspends until the unit answers or the
    /// timeout elapses. No implicit retry.
    pub async fn ask(&self, message: Message, timeout: Duration) -> Result<Message, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.mailbox
            .send(Delivery {
                message,
                sender: None,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| TransportError::MailboxClosed(self.path.clone()))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ReplyDropped(self.path.clone())),
            Err(_) => Err(TransportError::AskTimeout(timeout)),
        }
    }

    /// The reply capability pointing back at this unit.
    #[must_use]
    pub fn as_sender(&self) -> Sender {
        Sender {
            receiver: self.clone(),
            read_only: false,
        }
    }
}

/// Reply capability of a message originator.
///
/// Secondary receivers get a read-only copy: they observe the message but
/// can never answer in the originator's request flow.
#[derive(Clone)]
pub struct Sender {
    receiver: Receiver,
    read_only: bool,
}

impl Sender {
    /// The originator's unit path.
    #[must_use]
    pub fn path(&self) -> &UnitPath {
        self.receiver.path()
    }

    /// Whether this capability permits replying.
    #[must_use]
    pub fn can_reply(&self) -> bool {
        !self.read_only
    }

    /// Downgrade to a read-only capability.
    #[must_use]
    pub fn read_only(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            read_only: true,
        }
    }

    /// Send a message back to the originator.
    ///
    /// Fails without delivering anything when the capability is read-only.
    pub async fn reply(&self, message: Message) -> Result<(), TransportError> {
        if self.read_only {
            return Err(TransportError::ReplyNotPermitted(
                self.receiver.path().clone(),
            ));
        }
        self.receiver.tell(message, None).await
    }
}

/// In-process path resolver.
///
/// All nodes of a single-process mesh share one transport; unit paths are
/// cluster-unique, so registration never collides.
#[derive(Default)]
pub struct LocalTransport {
    units: RwLock<HashMap<UnitPath, Receiver>>,
}

impl LocalTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit's receiver under its path.
    pub fn register(&self, receiver: Receiver) {
        debug!(path = %receiver.path(), "Unit registered with transport");
        if let Ok(mut units) = self.units.write() {
            units.insert(receiver.path().clone(), receiver);
        }
    }

    /// Remove a unit's registration.
    pub fn deregister(&self, path: &UnitPath) {
        if let Ok(mut units) = self.units.write() {
            units.remove(path);
        }
    }

    /// Resolve a path to its receiver.
    #[must_use]
    pub fn resolve(&self, path: &UnitPath) -> Option<Receiver> {
        self.units.read().ok().and_then(|units| units.get(path).cloned())
    }

    /// Fire-and-forget delivery to a path.
    pub async fn tell(
        &self,
        path: &UnitPath,
        message: Message,
        sender: Option<Sender>,
    ) -> Result<(), TransportError> {
        let receiver = self
            .resolve(path)
            .ok_or_else(|| TransportError::UnknownPath(path.clone()))?;
        receiver.tell(message, sender).await
    }

    /// Request/response delivery to a path.
    pub async fn ask(
        &self,
        path: &UnitPath,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let receiver = self
            .resolve(path)
            .ok_or_else(|| TransportError::UnknownPath(path.clone()))?;
        receiver.ask(message, timeout).await
    }
}
