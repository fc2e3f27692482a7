//! Community name normalization.

use crate::errors::{CrawlError, Result};

/// Normalizes a community name to its canonical key.
///
/// Strips a leading `r/` or `/r/`, trims whitespace and lowercases. The
/// result must be non-empty and contain only ASCII letters, digits and
/// underscores.
pub fn canonical_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let stripped = lowered
        .strip_prefix("/r/")
        .or_else(|| lowered.strip_prefix("r/"))
        .unwrap_or(&lowered);

    if stripped.is_empty()
        || !stripped
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(CrawlError::malformed(raw));
    }
    Ok(stripped.to_string())
}

/// Returns true if `raw` normalizes to a valid name.
#[must_use]
pub fn is_valid_name(raw: &str) -> bool {
    canonical_name(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_normalizes() {
        assert_eq!(canonical_name("Cats").unwrap(), "cats");
        assert_eq!(canonical_name("  r/AskReddit ").unwrap(), "askreddit");
        assert_eq!(canonical_name("/r/rust_gamedev").unwrap(), "rust_gamedev");
        assert_eq!(canonical_name("R/Dogs").unwrap(), "dogs");
    }

    #[test]
    fn test_canonical_name_rejects_malformed() {
        for raw in ["", "   ", "r/", "/r/", "cats!", "two words", "ünï", "a/b"] {
            let err = canonical_name(raw).unwrap_err();
            assert!(matches!(err, CrawlError::MalformedName { .. }), "{raw:?}");
        }
        assert!(!is_valid_name("r/"));
        assert!(is_valid_name("r/ok"));
    }
}
