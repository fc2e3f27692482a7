//! Ready-made configurations and backends.

use super::mocks::ScriptedApi;
use crate::client::{BackoffConfig, JitterStrategy};
use crate::config::CrawlerConfig;

/// Millisecond backoff without jitter.
#[must_use]
pub fn fast_backoff(max_attempts: usize) -> BackoffConfig {
    BackoffConfig::new()
        .with_max_attempts(max_attempts)
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
        .with_jitter(JitterStrategy::None)
}

/// A config for tests: explicit seeds, no pacing, fast backoff.
#[must_use]
pub fn test_config<I, S>(seeds: I) -> CrawlerConfig
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CrawlerConfig::new()
        .with_workers(4)
        .with_seed_terms(seeds)
        .with_rate_limit(None)
        .with_backoff(fast_backoff(3))
}

/// Seed `a` finds `cats` and `dogs`; `cats` mentions `dogs` and `birds`.
#[must_use]
pub fn cats_dogs_birds() -> ScriptedApi {
    ScriptedApi::new()
        .with_search("a", [("cats", false), ("dogs", false)])
        .with_profile("cats", false, "related to r/dogs and r/birds")
        .with_profile("dogs", false, "good boys only")
        .with_profile("birds", false, "")
}

/// Seed `a` finds `c0`; each `c{i}` mentions `c{i+1}` up to `c{len-1}`.
#[must_use]
pub fn mention_chain(len: usize) -> ScriptedApi {
    let mut api = ScriptedApi::new().with_search("a", [("c0", false)]);
    for i in 0..len {
        let description = if i + 1 < len {
            format!("next up: r/c{}", i + 1)
        } else {
            "end of the line".to_string()
        };
        api = api.with_profile(&format!("c{i}"), false, &description);
    }
    api
}

/// Seed `a` finds `hub`; `hub` mentions `spoke0..spokes`, every spoke
/// mentions `hub` and every other spoke.
#[must_use]
pub fn dense_star(spokes: usize) -> ScriptedApi {
    let names: Vec<String> = (0..spokes).map(|i| format!("spoke{i}")).collect();
    let all = names.iter().map(|n| format!("r/{n}")).collect::<Vec<_>>().join(" ");
    let mut api = ScriptedApi::new()
        .with_search("a", [("hub", false)])
        .with_profile("hub", false, &all);
    for name in &names {
        api = api.with_profile(name, false, &format!("back to r/hub, also {all}"));
    }
    api
}
