use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use subcrawl::client::RedditClient;
use subcrawl::crawler::WorkerPool;
use subcrawl::events::{ChannelEventSink, EventSink, LoggingEventSink};
use subcrawl::persistence::{Autosaver, SnapshotFile};

mod args;
mod export;

use args::Args;

const EVENT_BUFFER: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; values may come from the environment or flags.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(&args)?;

    let config = args.crawler_config();
    info!(
        workers = config.workers,
        search_term_length = config.search_term_length,
        search_limit = config.search_limit,
        max_communities = ?config.max_communities,
        max_api_calls = ?config.max_api_calls,
        "Subcrawl starting"
    );

    let api = Arc::new(RedditClient::new(args.reddit_config()).context("building API client")?);

    let (sink, exporter): (Arc<dyn EventSink>, _) = match &args.events_file {
        Some(path) => {
            let (sink, events) = ChannelEventSink::new(EVENT_BUFFER);
            let writer = export::spawn_jsonl_writer(path, events).await?;
            (Arc::new(sink), Some(writer))
        }
        None => (Arc::new(LoggingEventSink::debug()), None),
    };

    let pool = WorkerPool::builder(api)
        .config(config)
        .event_sink(sink)
        .build()
        .context("invalid crawler configuration")?;

    let file = Arc::new(SnapshotFile::new(&args.save_path).with_backup_every(args.backup_every));
    if args.fresh {
        info!(path = %file.path().display(), "Starting fresh");
    } else if let Some(snapshot) = file
        .load_or_backup()
        .with_context(|| format!("loading {}", file.path().display()))?
    {
        let summary = pool.restore(&snapshot).context("restoring saved graph")?;
        info!(
            communities = summary.communities,
            requeued = summary.requeued,
            skipped = summary.skipped,
            "Resumed from saved graph"
        );
    }

    let autosave = Autosaver::new(Arc::clone(&file), pool.graph())
        .with_interval(args.save_interval())
        .with_run_id(pool.run_id().to_string())
        .spawn();

    let token = pool.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work");
            token.cancel("interrupted by user");
        }
    });

    let progress = pool.progress_handle();
    let interval = args.progress_interval();
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(progress = %progress.snapshot(), "Progress");
        }
    });

    let outcome = pool.run().await;

    reporter.abort();
    interrupt.abort();
    let _ = tokio::join!(reporter, interrupt);
    autosave.finish().await.context("saving final graph")?;

    // The exporter drains until the pool's sink is dropped.
    drop(pool);
    if let Some(exporter) = exporter {
        match exporter.await {
            Ok(written) => info!(events = written, "Event export finished"),
            Err(join_error) => warn!(error = %join_error, "Event export task failed"),
        }
    }

    match outcome {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                stop_reason = %report.stop_reason,
                elapsed_secs = report.elapsed.as_secs_f64(),
                progress = %report.progress,
                "Crawl finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(crawl_error) => {
            error!(error = %crawl_error, "Crawl aborted");
            Err(crawl_error).context("crawl aborted")
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(args.log_file.is_none());

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
