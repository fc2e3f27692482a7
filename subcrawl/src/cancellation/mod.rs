//! Structured cancellation utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative, await-able cancellation
//! - StructuredTaskGroup for running the worker tasks of one crawl

mod task_group;
mod token;

pub use task_group::StructuredTaskGroup;
pub use token::{CancelCallback, CancellationToken};
