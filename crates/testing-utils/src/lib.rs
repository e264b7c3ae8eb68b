//! # Shuffler Testing Utils
//!
//! Shared testing utilities for the round orchestrator crates:
//!
//! - **Builders**: test entities with sensible defaults
//! - **Environment**: in-memory store, lock, blob store and queue wired together
//! - **Mocks**: plan executor test doubles
//!
//! ```toml
//! [dev-dependencies]
//! shuffler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
