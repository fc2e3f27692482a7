//! Saving and restoring discovery graphs.
//!
//! Snapshots are pretty-printed JSON keyed by community name. A run can be
//! resumed by loading a [`SnapshotFile`] and passing it to
//! [`WorkerPool::restore`](crate::crawler::WorkerPool::restore).

mod autosave;
mod snapshot_file;

pub use autosave::{AutosaveHandle, Autosaver};
pub use snapshot_file::SnapshotFile;
