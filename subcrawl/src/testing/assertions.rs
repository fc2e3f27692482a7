//! Test assertions for graphs.

use crate::graph::{GraphSnapshot, Mention};

/// Asserts that every mention's endpoints exist.
pub fn assert_graph_consistent(snapshot: &GraphSnapshot) {
    let dangling = snapshot.dangling_mentions();
    assert!(
        dangling.is_empty(),
        "Mentions point at missing communities: {dangling:?}"
    );
}

/// Asserts the exact set of community names.
pub fn assert_communities(snapshot: &GraphSnapshot, expected: &[&str]) {
    let mut expected: Vec<&str> = expected.to_vec();
    expected.sort_unstable();
    let actual: Vec<&str> = snapshot.communities.keys().map(String::as_str).collect();
    assert_eq!(actual, expected, "Community sets differ");
}

/// Asserts the exact set of mention edges.
pub fn assert_mentions(snapshot: &GraphSnapshot, expected: &[(&str, &str)]) {
    let mut expected: Vec<Mention> = expected.iter().map(|(s, t)| Mention::new(*s, *t)).collect();
    expected.sort();
    let actual: Vec<Mention> = snapshot.mentions().collect();
    assert_eq!(actual, expected, "Mention sets differ");
}

/// Asserts that no community appears twice in a list of described names.
pub fn assert_described_once(described: &[String]) {
    let mut seen = std::collections::HashSet::new();
    let repeats: Vec<&String> = described.iter().filter(|n| !seen.insert(*n)).collect();
    assert!(repeats.is_empty(), "Described more than once: {repeats:?}");
}
