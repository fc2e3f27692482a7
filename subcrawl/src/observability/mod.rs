//! Observability utilities.

mod progress;

pub use progress::{ProgressCounters, ProgressSnapshot};
