//! # Mesh Store - Replicated Store Boundary
//!
//! The pattern directory lives in an external replicated key-value store
//! with configurable per-call consistency. This crate defines that boundary
//! as a driven port ([`ReplicatedStore`]) and ships the in-memory reference
//! adapter used for single-process operation and tests.
//!
//! ## Consistency model
//!
//! - [`Consistency::Local`] answers from the local replica: fast, possibly
//!   stale while the store's gossip is still propagating.
//! - [`Consistency::Quorum`] forces agreement across replicas: slower, used
//!   where visibility must be guaranteed (convergence checks, removals).
//!
//! Callers choose per call based on whether staleness is tolerable; the
//! directory matches at `Local` and escalates to `Quorum` on a miss.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod memory;
pub mod store;

// Re-export main types
pub use memory::{InMemoryReplicatedStore, ReplicaHandle};
pub use store::{Consistency, ReplicatedStore, StoreError};
