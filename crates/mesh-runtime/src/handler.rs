//! Message handlers and their execution context.
//!
//! A native handler is the code form of an action; the script form is a
//! source string interpreted by the [`ScriptEngine`] collaborator, resolved
//! once when the owning system starts. Handlers run inside their unit's
//! mailbox task and receive a [`UnitContext`] carrying the unit path, the
//! originator's reply capability, and the unit's scoped resource.

use std::any::Any;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use mesh_types::{Message, UnitPath};

use crate::transport::Sender;

/// Errors from handler execution.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not process the message.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Errors from script execution.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The interpreter rejected or aborted the script.
    #[error("script failed: {0}")]
    Failed(String),
}

/// A native action body.
///
/// Returning `Ok(Some(reply))` answers the originator when the delivery
/// permits a reply (a request/response exchange, or a reply-capable
/// sender); the unit loop routes the reply, handlers never touch the
/// response slot themselves.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one matching message.
    async fn handle(
        &self,
        message: &Message,
        ctx: &mut UnitContext<'_>,
    ) -> Result<Option<Message>, HandlerError>;
}

/// Abstract interface to the external script interpreter.
///
/// Script action bodies are an optional integration; the interpreter
/// itself lives outside the mesh. The engine receives the raw script
/// source and the matching message, and may produce a reply.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Interpret a script against one matching message.
    async fn run(&self, script: &str, message: &Message) -> Result<Option<Message>, ScriptError>;
}

/// Constructor for a unit's scoped resource.
pub type ResourceCtor = std::sync::Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// A unit-scoped resource, created on first use and dropped when the unit
/// stops — on every exit path, not via finalizers.
pub(crate) struct LazyResource {
    ctor: Option<ResourceCtor>,
    value: Option<Box<dyn Any + Send>>,
    path: UnitPath,
}

impl LazyResource {
    pub(crate) fn new(path: UnitPath, ctor: Option<ResourceCtor>) -> Self {
        Self {
            ctor,
            value: None,
            path,
        }
    }

    /// The resource, creating it on first access. `None` when the unit has
    /// no resource constructor registered.
    pub(crate) fn get_or_init(&mut self) -> Option<&mut (dyn Any + Send)> {
        if self.value.is_none() {
            let ctor = self.ctor.as_ref()?;
            debug!(path = %self.path, "Unit resource created");
            self.value = Some(ctor());
        }
        self.value.as_mut().map(|boxed| boxed.as_mut())
    }

    /// Drop the resource now, if it was ever created.
    pub(crate) fn release(&mut self) {
        if self.value.take().is_some() {
            debug!(path = %self.path, "Unit resource released");
        }
    }
}

/// Execution context handed to an action for one delivery.
pub struct UnitContext<'a> {
    path: &'a UnitPath,
    sender: Option<&'a Sender>,
    resource: &'a mut LazyResource,
}

impl<'a> UnitContext<'a> {
    pub(crate) fn new(
        path: &'a UnitPath,
        sender: Option<&'a Sender>,
        resource: &'a mut LazyResource,
    ) -> Self {
        Self {
            path,
            sender,
            resource,
        }
    }

    /// The path of the unit processing the message.
    #[must_use]
    pub fn path(&self) -> &UnitPath {
        self.path
    }

    /// The originator's reply capability, when the delivery carried one.
    #[must_use]
    pub fn sender(&self) -> Option<&Sender> {
        self.sender
    }

    /// The unit's scoped resource, created on first access.
    ///
    /// `None` when no resource constructor was registered for the unit.
    /// Handlers downcast to the concrete type they registered.
    pub fn resource(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.resource.get_or_init()
    }
}
