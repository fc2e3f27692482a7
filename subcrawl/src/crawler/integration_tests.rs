//! End-to-end tests for discovery runs.

#[cfg(test)]
mod tests {
    use crate::client::BackoffConfig;
    use crate::crawler::{StopReason, WorkerPool};
    use crate::errors::{ApiError, CrawlError};
    use crate::events::{CollectingEventSink, EventSink};
    use crate::graph::GraphSnapshot;
    use crate::testing::{
        assert_communities, assert_described_once, assert_graph_consistent, assert_mentions,
        cats_dogs_birds, dense_star, mention_chain, test_config, ScriptedApi,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    async fn crawl(api: &Arc<ScriptedApi>, seeds: &[&str]) -> (WorkerPool, GraphSnapshot) {
        let pool = WorkerPool::new(test_config(seeds.iter().copied()), api.clone()).unwrap();
        let report = pool.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        let snapshot = pool.snapshot();
        (pool, snapshot)
    }

    #[tokio::test]
    async fn test_cats_dogs_birds_scenario() {
        let api = Arc::new(cats_dogs_birds());
        let sink = Arc::new(CollectingEventSink::new());

        let pool = WorkerPool::builder(api.clone())
            .config(test_config(["a"]).with_workers(2))
            .event_sink(sink.clone() as Arc<dyn EventSink>)
            .build()
            .unwrap();
        let report = pool.run().await.unwrap();
        let snapshot = pool.snapshot();

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_communities(&snapshot, &["birds", "cats", "dogs"]);
        assert_mentions(&snapshot, &[("cats", "birds"), ("cats", "dogs")]);
        assert_graph_consistent(&snapshot);

        assert_eq!(snapshot.communities["cats"].search_terms, vec!["a".to_string()]);
        assert!(snapshot.communities["birds"].search_terms.is_empty());
        assert_eq!(snapshot.confirmed_count(), 3);

        // dogs was both a search hit and a mention target.
        assert_eq!(api.describe_calls("dogs"), 1);
        assert_described_once(&api.described());

        let mut discovered = sink.communities();
        discovered.sort();
        assert_eq!(discovered, vec!["birds", "cats", "dogs"]);
        assert_eq!(sink.mentions().len(), 2);

        assert_eq!(report.progress.searches, 1);
        assert_eq!(report.progress.descriptions, 3);
        assert_eq!(report.progress.api_calls, 4);
        assert_eq!(report.progress.in_flight, 0);
        assert_eq!(report.progress.errors, 0);
    }

    #[tokio::test]
    async fn test_stub_is_recorded_before_it_is_described() {
        // birds is never describable: it must still exist as an unconfirmed stub.
        let api = Arc::new(
            ScriptedApi::new()
                .with_search("a", [("cats", false)])
                .with_profile("cats", true, "see r/birds"),
        );
        let (pool, snapshot) = crawl(&api, &["a"]).await;

        assert_communities(&snapshot, &["birds", "cats"]);
        assert!(!snapshot.communities["birds"].confirmed);
        assert!(snapshot.communities["cats"].nsfw);
        assert_eq!(pool.progress().skipped, 1);
    }

    #[tokio::test]
    async fn test_community_cap_stops_after_exactly_two() {
        for workers in [1, 4] {
            let api = Arc::new(mention_chain(5));
            let config = test_config(["a"]).with_workers(workers).with_max_communities(2);
            let pool = WorkerPool::new(config, api.clone()).unwrap();

            let report = pool.run().await.unwrap();

            assert_eq!(report.stop_reason, StopReason::CommunityCap { limit: 2 });
            assert_eq!(pool.graph().confirmed_count(), 2);
            assert!(pool.graph().len() < 5);
            assert!(api.describe_calls("c3") == 0 && api.describe_calls("c4") == 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_community_cap_holds_under_parallel_describes() {
        for _ in 0..5 {
            let names: Vec<String> = (0..5).map(|i| format!("hit{i}")).collect();
            let mut api = ScriptedApi::new()
                .with_search("a", names.iter().map(|n| (n.clone(), false)))
                .with_latency(Duration::from_millis(5));
            for name in &names {
                api = api.with_profile(name, false, "no references");
            }
            let api = Arc::new(api);
            let config = test_config(["a"]).with_workers(4).with_max_communities(2);
            let pool = WorkerPool::new(config, api.clone()).unwrap();

            let report = pool.run().await.unwrap();

            assert_eq!(report.stop_reason, StopReason::CommunityCap { limit: 2 });
            assert_eq!(pool.graph().confirmed_count(), 2);
            assert_eq!(pool.graph().len(), 5);
            assert_graph_consistent(&pool.snapshot());
        }
    }

    #[tokio::test]
    async fn test_call_budget_stops_run() {
        let api = Arc::new(mention_chain(10));
        let config = test_config(["a"]).with_workers(3).with_max_api_calls(3);
        let pool = WorkerPool::new(config, api.clone()).unwrap();

        let report = pool.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::CallBudget { limit: 3 });
        assert_eq!(api.total_calls(), 3);
        assert_eq!(report.progress.api_calls, 3);
        assert_graph_consistent(&pool.snapshot());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dense_graph_describes_every_name_once() {
        let api = Arc::new(dense_star(20).with_latency(Duration::from_millis(1)));
        let config = test_config(["a"]).with_workers(8);
        let pool = WorkerPool::new(config, api.clone()).unwrap();

        let report = pool.run().await.unwrap();
        let snapshot = pool.snapshot();

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_described_once(&api.described());
        assert_eq!(snapshot.len(), 21);
        assert_eq!(snapshot.confirmed_count(), 21);
        assert_eq!(snapshot.mention_count(), 20 + 20 * 20);
        assert_graph_consistent(&snapshot);
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal() {
        let api = Arc::new(cats_dogs_birds().failing_search("a", ApiError::auth("invalid_grant")));
        let pool = WorkerPool::new(test_config(["a"]), api.clone()).unwrap();

        let result = pool.run().await;

        assert!(matches!(result, Err(CrawlError::Api(ApiError::Auth(_)))));
        assert!(pool.cancel_token().is_cancelled());
        assert_eq!(api.search_calls("a"), 1);
        assert!(pool.graph().is_empty());
    }

    #[tokio::test]
    async fn test_auth_error_keeps_partial_graph() {
        let api = Arc::new(cats_dogs_birds().failing_describe("birds", ApiError::auth("revoked")));
        let pool = WorkerPool::new(test_config(["a"]).with_workers(1), api).unwrap();

        assert!(pool.run().await.is_err());

        let snapshot = pool.snapshot();
        assert!(snapshot.communities.contains_key("birds"));
        assert!(snapshot.communities["cats"].confirmed);
        assert_graph_consistent(&snapshot);
    }

    #[tokio::test]
    async fn test_rate_limited_task_is_dropped_after_max_attempts() {
        let api = Arc::new(
            cats_dogs_birds().failing_describe("cats", ApiError::RateLimited { retry_after: None }),
        );
        let (pool, snapshot) = crawl(&api, &["a"]).await;

        assert_eq!(api.describe_calls("cats"), 3);
        assert!(!snapshot.communities["cats"].confirmed);
        assert!(snapshot.communities["dogs"].confirmed);
        assert!(!snapshot.communities.contains_key("birds"));

        let progress = pool.progress();
        assert_eq!(progress.errors, 1);
        assert_eq!(progress.retries, 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let api = Arc::new(cats_dogs_birds().failing_describe_times(
            "cats",
            ApiError::transient("502 bad gateway"),
            2,
        ));
        let (_pool, snapshot) = crawl(&api, &["a"]).await;

        assert_eq!(api.describe_calls("cats"), 3);
        assert!(snapshot.communities["cats"].confirmed);
        assert_mentions(&snapshot, &[("cats", "birds"), ("cats", "dogs")]);
    }

    #[tokio::test]
    async fn test_not_found_private_and_malformed_are_skipped() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_search("a", [("ghost", false), ("secret", false), ("bad name!", false), ("ok", false)])
                .with_private("secret")
                .with_profile("ok", false, ""),
        );
        let (pool, snapshot) = crawl(&api, &["a"]).await;

        assert_communities(&snapshot, &["ghost", "ok", "secret"]);
        assert_eq!(snapshot.confirmed_count(), 1);
        assert!(!snapshot.communities["secret"].confirmed);

        let progress = pool.progress();
        assert_eq!(progress.skipped, 3);
        assert_eq!(progress.errors, 0);
    }

    #[tokio::test]
    async fn test_search_limit_is_applied() {
        let api = Arc::new(cats_dogs_birds());
        let config = test_config(["a"]).with_search_limit(1);
        let pool = WorkerPool::new(config, api).unwrap();
        pool.run().await.unwrap();

        let graph = pool.graph();
        assert!(graph.contains("cats"));
        // dogs still arrives, through cats' description.
        assert!(graph.get("dogs").unwrap().search_terms.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_promptly() {
        let api = Arc::new(
            cats_dogs_birds().failing_describe("cats", ApiError::RateLimited { retry_after: None }),
        );
        let backoff = BackoffConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(30_000)
            .with_max_delay_ms(60_000);
        let config = test_config(["a"]).with_workers(2).with_backoff(backoff);
        let pool = WorkerPool::new(config, api).unwrap();

        let token = pool.cancel_token();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel("user abort");
        });

        let started = Instant::now();
        let report = pool.run().await.unwrap();
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            report.stop_reason,
            StopReason::Cancelled {
                reason: "user abort".to_string()
            }
        );
        assert_graph_consistent(&pool.snapshot());
    }

    #[tokio::test]
    async fn test_cancel_before_run_does_no_work() {
        let api = Arc::new(cats_dogs_birds());
        let pool = WorkerPool::new(test_config(["a"]), api.clone()).unwrap();
        pool.cancel_token().cancel("shutdown");

        let report = pool.run().await.unwrap();

        assert!(matches!(report.stop_reason, StopReason::Cancelled { .. }));
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_restore_without_rescan_skips_confirmed() {
        let first = Arc::new(cats_dogs_birds());
        let (_pool, snapshot) = crawl(&first, &["a"]).await;

        let second = Arc::new(cats_dogs_birds());
        let pool = WorkerPool::new(test_config(["a"]), second.clone()).unwrap();
        let summary = pool.restore(&snapshot).unwrap();
        assert_eq!(summary.requeued, 0);
        assert_eq!(summary.skipped, 3);

        let report = pool.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(second.search_calls("a"), 1);
        assert!(second.described().is_empty());
        assert_eq!(pool.snapshot().communities, snapshot.communities);
    }

    #[tokio::test]
    async fn test_restore_with_rescan_describes_again() {
        let first = Arc::new(cats_dogs_birds());
        let (_pool, snapshot) = crawl(&first, &["a"]).await;

        let second = Arc::new(cats_dogs_birds());
        let config = test_config(["a"]).with_rescan_on_rediscovery(true);
        let pool = WorkerPool::new(config, second.clone()).unwrap();
        assert_eq!(pool.restore(&snapshot).unwrap().requeued, 3);

        pool.run().await.unwrap();

        assert_described_once(&second.described());
        assert_eq!(second.described().len(), 3);
        assert_eq!(pool.graph().mention_count(), 2);
        assert_eq!(pool.graph().confirmed_count(), 3);
    }

    #[tokio::test]
    async fn test_restore_requeues_stubs() {
        let json = r#"{"communities": {
            "cats": {"confirmed": true, "mentions": ["birds"]},
            "birds": {"confirmed": false}
        }}"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();

        let api = Arc::new(cats_dogs_birds());
        let pool = WorkerPool::new(test_config(["zzz"]), api.clone()).unwrap();
        let summary = pool.restore(&snapshot).unwrap();
        assert_eq!((summary.requeued, summary.skipped), (1, 1));

        pool.run().await.unwrap();

        assert_eq!(api.described(), vec!["birds".to_string()]);
        assert!(pool.graph().get("birds").unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_restored_confirmations_count_towards_cap() {
        let first = Arc::new(cats_dogs_birds());
        let (_pool, snapshot) = crawl(&first, &["a"]).await;

        let second = Arc::new(cats_dogs_birds());
        let config = test_config(["a"]).with_max_communities(2);
        let pool = WorkerPool::new(config, second.clone()).unwrap();
        pool.restore(&snapshot).unwrap();

        let report = pool.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::CommunityCap { limit: 2 });
        assert_eq!(second.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_pool_runs_once() {
        let api = Arc::new(cats_dogs_birds());
        let (pool, _) = crawl(&api, &["a"]).await;

        assert!(matches!(pool.run().await, Err(CrawlError::Config(_))));
        assert!(pool.restore(&GraphSnapshot::default()).is_err());
    }

    #[tokio::test]
    async fn test_progress_handle_tracks_run() {
        let api = Arc::new(mention_chain(4));
        let pool = WorkerPool::new(test_config(["a", "b"]), api).unwrap();
        let handle = pool.progress_handle();

        assert_eq!(handle.snapshot().seeds_total, 2);
        pool.run().await.unwrap();

        let progress = handle.snapshot();
        assert_eq!(progress.seeds_claimed, 2);
        assert_eq!(progress.searches, 2);
        assert_eq!(progress.confirmed, 4);
        assert_eq!(progress.queue_depth, 0);
    }
}
