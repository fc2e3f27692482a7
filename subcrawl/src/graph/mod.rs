//! The community graph and its snapshot format.

mod model;
mod store;

pub use model::{Community, CommunitySnapshot, GraphSnapshot, Mention, SnapshotMetadata};
pub use store::GraphStore;
