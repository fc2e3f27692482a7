//! Seed term generation.

use std::collections::HashSet;

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Iterator over seed search terms.
///
/// Generated terms run through every string over `a..=z` in
/// length-then-lexicographic order: `a`, `b`, ..., `z`, `aa`, `ab`, ...
#[derive(Debug, Clone)]
pub struct SearchTerms {
    source: Source,
    total: usize,
    emitted: usize,
}

#[derive(Debug, Clone)]
enum Source {
    Generated {
        /// Alphabet indices of the next term; `None` once exhausted.
        next: Option<Vec<usize>>,
        max_length: usize,
    },
    Explicit(std::vec::IntoIter<String>),
}

impl SearchTerms {
    /// Generates every term up to `max_length` characters.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        let total = (1..=max_length)
            .map(|len| u32::try_from(len).map_or(usize::MAX, |len| 26usize.saturating_pow(len)))
            .fold(0usize, usize::saturating_add);
        let next = (max_length > 0).then(|| vec![0]);
        Self {
            source: Source::Generated { next, max_length },
            total,
            emitted: 0,
        }
    }

    /// Uses an explicit list. Blank entries and repeats are skipped.
    #[must_use]
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.into().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        Self {
            total: terms.len(),
            source: Source::Explicit(terms.into_iter()),
            emitted: 0,
        }
    }

    /// Number of terms this iterator yields in total.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of terms yielded so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Returns true once every term has been yielded.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.emitted >= self.total
    }
}

impl Iterator for SearchTerms {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let term = match &mut self.source {
            Source::Explicit(iter) => iter.next(),
            Source::Generated { next, max_length } => {
                let current = next.take()?;
                let term: String = current.iter().map(|&i| char::from(ALPHABET[i])).collect();
                *next = advance(current, *max_length);
                Some(term)
            }
        };
        if term.is_some() {
            self.emitted += 1;
        }
        term
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.saturating_sub(self.emitted);
        (remaining, Some(remaining))
    }
}

/// Odometer increment; rolls over into the next length.
fn advance(mut digits: Vec<usize>, max_length: usize) -> Option<Vec<usize>> {
    for pos in (0..digits.len()).rev() {
        if digits[pos] + 1 < ALPHABET.len() {
            digits[pos] += 1;
            return Some(digits);
        }
        digits[pos] = 0;
    }
    let len = digits.len() + 1;
    (len <= max_length).then(|| vec![0; len])
}
