//! Echo sample unit.
//!
//! The smallest useful registration: answers any message carrying an
//! `/echo` node with the same content. Doubles as a liveness probe for a
//! freshly wired mesh.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use mesh_runtime::{HandlerError, MessageHandler, PatternActionsRegistry, UnitContext};
use mesh_types::{Message, Pattern, PatternError};

/// Unit id of the echo sample.
pub const ECHO_UNIT: &str = "echo";

/// Replies to `/echo` messages with their own content.
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        message: &Message,
        _ctx: &mut UnitContext<'_>,
    ) -> Result<Option<Message>, HandlerError> {
        let structure = message
            .structure()
            .map_err(|e| HandlerError::Failed(e.to_string()))?;
        info!(%message, "=====> echo");
        Ok(Some(message.reply_with(&structure)))
    }
}

/// Register the echo unit.
pub fn register(registry: &mut PatternActionsRegistry) -> Result<(), PatternError> {
    registry.add_handler(Pattern::new(&["/echo"])?, Arc::new(EchoHandler), ECHO_UNIT);
    Ok(())
}
