use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use subcrawl::events::CrawlEvent;

/// Appends every received event to `path` as one JSON object per line.
///
/// The task ends once all senders are dropped.
pub async fn spawn_jsonl_writer(
    path: &Path,
    mut events: mpsc::Receiver<CrawlEvent>,
) -> Result<JoinHandle<u64>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening events file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    Ok(tokio::spawn(async move {
        let mut written = 0;
        while let Some(event) = events.recv().await {
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(error) => {
                    warn!(error = %error, "Skipping unserializable event");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(error) = out.write_all(&line).await {
                warn!(error = %error, "Event export stopped");
                return written;
            }
            written += 1;
        }
        if let Err(error) = out.flush().await {
            warn!(error = %error, "Failed to flush events file");
        }
        written
    }))
}
