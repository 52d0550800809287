//! # SimGrid Testing Utils
//!
//! Shared testing utilities for the simgrid workspace.
//!
//! ## Features
//!
//! - **Scripted workers**: in-memory `WorkerEndpoint` that plays back crashes,
//!   rejections, hangs and transport errors
//! - **Test data builders**: `WorkerInfo`, `JobSpec` and complexity fixtures
//! - **Helpers**: small simulation specs and async wait utilities
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! simgrid-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
