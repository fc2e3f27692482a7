//! Mention extraction from community descriptions.

use regex::Regex;
use std::collections::BTreeSet;

use super::names::canonical_name;
use crate::errors::{CrawlError, Result};

const DEFAULT_SIGIL: &str = "r";

/// Finds community references such as `r/rust` or `/r/Rust` in free text.
///
/// A reference is the sigil followed by `/` and a name token, optionally
/// preceded by `/`, starting at a word boundary. Names are lowercased,
/// trailing punctuation is never part of a name, and the describing
/// community itself is excluded. Any non-word character counts as a
/// boundary, so URL paths such as `reddit.com/r/rust` are mentions too.
#[derive(Debug, Clone)]
pub struct RelationshipExtractor {
    sigil: String,
    pattern: Regex,
}

impl RelationshipExtractor {
    /// Creates an extractor for the `r/name` syntax.
    pub fn new() -> Result<Self> {
        Self::with_sigil(DEFAULT_SIGIL)
    }

    /// Creates an extractor for `{sigil}/name` references.
    ///
    /// The sigil must be ASCII letters only.
    pub fn with_sigil(sigil: &str) -> Result<Self> {
        if sigil.is_empty() || !sigil.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CrawlError::config(format!("invalid mention sigil {sigil:?}")));
        }
        let pattern = Regex::new(&format!(
            r"(?:^|[^A-Za-z0-9_])/?(?i:{})/([A-Za-z0-9_]+)",
            regex::escape(sigil)
        ))
        .map_err(|e| CrawlError::config(format!("mention pattern: {e}")))?;
        Ok(Self {
            sigil: sigil.to_string(),
            pattern,
        })
    }

    /// The sigil this extractor matches.
    #[must_use]
    pub fn sigil(&self) -> &str {
        &self.sigil
    }

    /// Returns the canonical names referenced by `text`, minus `self_name`.
    #[must_use]
    pub fn extract(&self, self_name: &str, text: &str) -> BTreeSet<String> {
        let own = self_name.to_ascii_lowercase();
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| canonical_name(m.as_str()).ok())
            .filter(|name| *name != own)
            .collect()
    }
}
