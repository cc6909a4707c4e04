//! Wire messages.
//!
//! On the wire a message is an opaque byte blob plus a content-type tag;
//! the receiving side reconstructs its native representation from the tag.
//! Matching never touches the bytes directly: [`Message::structure`] exposes
//! the parsed structural view the pattern conjuncts are evaluated against.
//!
//! JSON is the reference codec. The tag keeps the seam open for other
//! structured codecs without touching the directory or the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when decoding message content.
#[derive(Debug, Clone, Error)]
pub enum MessageError {
    /// The payload bytes do not parse under the declared content type.
    #[error("malformed {content_type} content: {reason}")]
    MalformedContent {
        /// Declared content type of the payload.
        content_type: ContentType,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Content-type tag carried with every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// JSON document.
    Json,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Json => f.write_str("json"),
        }
    }
}

/// An opaque wire message.
///
/// The correlation id ties a response back to the request that caused it;
/// replies built with [`Message::reply_with`] keep the originator's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    content_type: ContentType,
    bytes: Vec<u8>,
    correlation_id: Uuid,
}

impl Message {
    /// Build a JSON message from a structured value.
    #[must_use]
    pub fn json(content: &Value) -> Self {
        Self {
            content_type: ContentType::Json,
            bytes: content.to_string().into_bytes(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Rebuild a message from its wire form.
    #[must_use]
    pub fn from_bytes(content_type: ContentType, bytes: Vec<u8>) -> Self {
        Self {
            content_type,
            bytes,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Build a JSON reply correlated to an incoming message.
    #[must_use]
    pub fn reply_with(&self, content: &Value) -> Self {
        Self {
            content_type: ContentType::Json,
            bytes: content.to_string().into_bytes(),
            correlation_id: self.correlation_id,
        }
    }

    /// The declared content type.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// The raw payload bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Parse the structural view of the payload for pattern matching.
    pub fn structure(&self) -> Result<Value, MessageError> {
        match self.content_type {
            ContentType::Json => {
                serde_json::from_slice(&self.bytes).map_err(|e| MessageError::MalformedContent {
                    content_type: self.content_type,
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => write!(f, "[{}] {}", self.content_type, text),
            Err(_) => write!(f, "[{}] {} bytes", self.content_type, self.bytes.len()),
        }
    }
}
