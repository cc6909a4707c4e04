//! # Mesh Runtime - Processing Units and Dispatch
//!
//! Hosts the processing units and the content-based dispatcher.
//!
//! A unit is a mailbox task created from an explicit registration table:
//! each entry pairs a [`mesh_types::Pattern`] with an action (a native
//! handler or an externally-interpreted script). The dispatcher resolves an
//! outgoing message through the pattern directory, delivers it once to the
//! selected primary receiver, and fans a copy out to every secondary
//! receiver with a read-only sender so observers can never reply.
//!
//! ```text
//! send(msg) ──► PatternDirectory.match ──► [MatchResult...]
//!                                             │
//!                     ┌───────────────────────┴──────────────┐
//!                     ▼                                      ▼
//!              primary candidates                     secondary candidates
//!              (max score, weighted tie-break)        (every one, read-only)
//!                     │                                      │
//!                     ▼                                      ▼
//!               tell / ask once                      tell a copy each
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cluster;
pub mod handler;
pub mod registry;
pub mod system;
pub mod transport;
pub mod unit;

// Re-export main types
pub use cluster::{LocalCluster, LocalClusterHandle};
pub use handler::{HandlerError, MessageHandler, ResourceCtor, ScriptEngine, ScriptError, UnitContext};
pub use registry::{Action, PatternActionsRegistry, RegistryEntry};
pub use system::{DispatchError, MessageSystem, StartError};
pub use transport::{LocalTransport, Receiver, Sender, TransportError};
pub use unit::{ProcessingUnit, UnitHandle, UnitSpec};
