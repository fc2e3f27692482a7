//! Testing utilities for discovery runs.
//!
//! This module provides:
//! - [`ScriptedApi`], a table-driven fake backend with failure injection
//! - Fixture backends and configurations
//! - Graph assertions

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_communities, assert_described_once, assert_graph_consistent, assert_mentions,
};
pub use fixtures::{cats_dogs_birds, dense_star, fast_backoff, mention_chain, test_config};
pub use mocks::ScriptedApi;
