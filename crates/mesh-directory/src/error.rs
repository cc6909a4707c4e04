//! Directory error types.

use mesh_store::StoreError;
use mesh_types::MessageError;
use thiserror::Error;

/// Errors from directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A unit tried to publish without any pattern; nothing is written.
    #[error("unit {unit_id:?} cannot publish an empty pattern list")]
    EmptyPatternSet {
        /// The offending unit.
        unit_id: String,
    },

    /// The store kept failing after bounded retries.
    #[error("store unavailable during {operation} after {attempts} attempts: {source}")]
    StoreUnavailable {
        /// The directory operation that gave up.
        operation: &'static str,
        /// Attempts made before surfacing the failure.
        attempts: u32,
        /// Last store error observed.
        source: StoreError,
    },

    /// A directory record could not be encoded or decoded.
    #[error("record codec error for node {node}: {reason}")]
    Codec {
        /// The record's owning node.
        node: String,
        /// Codec diagnostic.
        reason: String,
    },

    /// The message to match does not parse under its content type.
    #[error(transparent)]
    MalformedMessage(#[from] MessageError),
}

/// Errors from weighted selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// Selection over an empty candidate list.
    #[error("cannot select from an empty candidate list")]
    NoCandidates,

    /// Mistrust factors must be strictly positive.
    #[error("mistrust factor at index {index} must be >= 1")]
    ZeroFactor {
        /// Index of the offending factor.
        index: usize,
    },
}

/// Errors from readiness waiting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    /// The watcher never converged within the allotted attempts. Fatal to
    /// node bring-up: dispatch correctness depends on peer visibility.
    #[error("directory did not converge within {attempts} gossip attempts")]
    Timeout {
        /// Poll attempts made.
        attempts: u32,
    },
}
