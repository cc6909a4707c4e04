//! # Mesh Directory - Distributed Pattern Directory
//!
//! The replicated registry at the heart of content-based routing. Each node
//! publishes one directory record describing its processing units and their
//! advertised patterns; the record is keyed by the node's own address, so
//! the store's conflict resolution is never exercised across writers.
//!
//! ## Pieces
//!
//! - [`PatternDirectory`] — publish, match and trust bookkeeping over the
//!   replicated store, with bounded retry against propagation lag.
//! - [`selector`] — mistrust-weighted random choice among equally scored
//!   receivers.
//! - [`ConvergenceWatcher`] — tracks cluster membership, waits for peers'
//!   records to become visible before declaring the node ready, and purges
//!   records of departed nodes.
//!
//! ## Consistency posture
//!
//! Matching tolerates brief staleness and reads at `Local` first; the
//! watcher explicitly escalates to `Quorum` because readiness must mean
//! "my peers' patterns are visible to me", not "probably visible soon".

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod directory;
pub mod error;
pub mod membership;
pub mod selector;
pub mod watcher;

// Re-export main types
pub use directory::{DirectorySettings, MistrustUpdate, PatternDirectory};
pub use error::{DirectoryError, ReadinessError, SelectorError};
pub use membership::ClusterMembership;
pub use watcher::{ConvergenceWatcher, WatcherHandle};
