//! # MapiSync Testkit
//!
//! Test utilities for mapisync.
//!
//! This crate provides:
//! - An in-memory server reachable through the loopback channel
//! - Session fixtures and property builders
//! - Property-based test generators using proptest
//! - Fuzz testing harnesses
//! - Test log setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mapisync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_server() {
//!     let harness = TestHarness::new();
//!     let id = harness.server().add_message(&harness.server().root(), vec![subject("hi")]);
//!     let message = harness.open(&id, OpenMode::ReadWrite);
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod logging;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::server::*;
    pub use mapisync_engine::OpenMode;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use logging::*;
pub use server::*;
