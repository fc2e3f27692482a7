use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use subcrawl::client::{BackoffConfig, RateLimitConfig, RedditConfig};
use subcrawl::config::CrawlerConfig;

#[derive(Parser, Debug)]
#[command(name = "subcrawl")]
#[command(about = "Map communities by the communities they mention.")]
#[command(version)]
pub struct Args {
    /// OAuth application id
    #[arg(long, env = "REDDIT_CLIENT_ID")]
    pub client_id: String,

    /// OAuth application secret
    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// User agent sent with every request
    #[arg(long, env = "REDDIT_USER_AGENT", default_value = "subcrawl/0.1")]
    pub user_agent: String,

    /// Longest generated search term (all a-z terms up to this length)
    #[arg(long, env = "SEARCH_TERM_LENGTH", default_value_t = 1)]
    pub search_term_length: usize,

    /// Explicit seed terms, replacing the generated ones
    #[arg(long = "seed", env = "SEED_TERMS", value_delimiter = ',')]
    pub seeds: Vec<String>,

    /// Results requested per search
    #[arg(long, env = "SEARCH_LIMIT", default_value_t = 10)]
    pub search_limit: usize,

    /// Concurrent workers
    #[arg(long, short, env = "CRAWLER_WORKERS", default_value_t = 3)]
    pub workers: usize,

    /// Stop after confirming this many communities
    #[arg(long, env = "MAX_COMMUNITIES")]
    pub max_communities: Option<usize>,

    /// Stop after this many upstream calls
    #[arg(long, env = "MAX_API_CALLS")]
    pub max_api_calls: Option<u64>,

    /// Sustained calls per minute across all workers
    #[arg(long, env = "REQUESTS_PER_MINUTE", default_value_t = 60)]
    pub requests_per_minute: u32,

    /// Calls allowed back-to-back before pacing
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 5)]
    pub burst: u32,

    /// Attempts per call before giving up on a task
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: usize,

    /// Describe confirmed communities again when resuming
    #[arg(long, env = "RESCAN_ON_REDISCOVERY")]
    pub rescan: bool,

    /// Where the graph is saved and resumed from
    #[arg(long, env = "SAVE_DATA_PATH", default_value = "reddit_crawl_data.json")]
    pub save_path: PathBuf,

    /// Start from an empty graph even if the save file exists
    #[arg(long)]
    pub fresh: bool,

    /// Seconds between autosaves
    #[arg(long, env = "SAVE_INTERVAL_SECS", default_value_t = 30)]
    pub save_interval: u64,

    /// Saves between backup copies (0 disables backups)
    #[arg(long, env = "BACKUP_EVERY", default_value_t = 10)]
    pub backup_every: u64,

    /// Write discovery events as JSON lines to this file
    #[arg(long, env = "EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Seconds between progress log lines
    #[arg(long, default_value_t = 10)]
    pub progress_interval: u64,

    /// Log as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn crawler_config(&self) -> CrawlerConfig {
        let mut config = CrawlerConfig::default()
            .with_workers(self.workers)
            .with_search_term_length(self.search_term_length)
            .with_search_limit(self.search_limit)
            .with_rescan_on_rediscovery(self.rescan)
            .with_rate_limit(Some(RateLimitConfig::new(
                self.requests_per_minute,
                self.burst,
            )))
            .with_backoff(BackoffConfig::default().with_max_attempts(self.max_attempts));

        if !self.seeds.is_empty() {
            config = config.with_seed_terms(self.seeds.iter().cloned());
        }
        if let Some(max) = self.max_communities {
            config = config.with_max_communities(max);
        }
        if let Some(max) = self.max_api_calls {
            config = config.with_max_api_calls(max);
        }
        config
    }

    pub fn reddit_config(&self) -> RedditConfig {
        RedditConfig::new(&self.client_id, &self.client_secret, &self.user_agent)
    }

    pub const fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval)
    }

    pub const fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["subcrawl", "--client-id", "id", "--client-secret", "secret"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_map_to_config() {
        let args = parse(&[]);
        let config = args.crawler_config();

        assert_eq!(config.workers, 3);
        assert_eq!(config.search_limit, 10);
        assert!(config.seed_terms.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_seed_list_and_caps() {
        let args = parse(&["--seed", "cats,dogs", "--max-communities", "50", "-w", "8"]);
        let config = args.crawler_config();

        assert_eq!(config.seed_terms, Some(vec!["cats".to_string(), "dogs".to_string()]));
        assert_eq!(config.max_communities, Some(50));
        assert_eq!(config.workers, 8);
    }
}
