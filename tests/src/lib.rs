//! # Relay Mesh Test Suite
//!
//! Unified test crate for cross-crate scenarios.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── convergence.rs   # readiness gating, record purge, lagging replicas
//!     ├── dispatch.rs      # routing: scores, secondaries, tie-breaks
//!     └── lifecycle.rs     # multi-node runtimes end to end
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mesh-tests
//! cargo test -p mesh-tests integration::dispatch::
//! ```

#![allow(dead_code)]

pub mod integration;
