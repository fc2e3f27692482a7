//! Seed terms, name normalization and mention extraction.

mod extractor;
mod names;
mod terms;

pub use extractor::RelationshipExtractor;
pub use names::{canonical_name, is_valid_name};
pub use terms::SearchTerms;
