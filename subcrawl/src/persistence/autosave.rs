//! Periodic background saves of a live graph.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::SnapshotFile;
use crate::cancellation::CancellationToken;
use crate::errors::{CrawlError, Result};
use crate::graph::GraphStore;

/// Saves a [`GraphStore`] to a [`SnapshotFile`] on a fixed interval.
#[derive(Debug, Clone)]
pub struct Autosaver {
    file: Arc<SnapshotFile>,
    graph: Arc<GraphStore>,
    interval: Duration,
    run_id: Option<String>,
}

impl Autosaver {
    /// Creates an autosaver that saves every 30 seconds.
    #[must_use]
    pub fn new(file: Arc<SnapshotFile>, graph: Arc<GraphStore>) -> Self {
        Self {
            file,
            graph,
            interval: Duration::from_secs(30),
            run_id: None,
        }
    }

    /// Sets the save interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Tags saved snapshots with a run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Snapshots the graph and writes it on the blocking pool.
    pub async fn save_now(&self) -> Result<()> {
        let mut snapshot = self.graph.snapshot();
        if let Some(run_id) = &self.run_id {
            snapshot = snapshot.with_run_id(run_id.clone());
        }
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.save(&snapshot))
            .await
            .map_err(|e| CrawlError::Task(format!("autosave: {e}")))?
    }

    /// Starts saving in the background until the handle is finished.
    #[must_use]
    pub fn spawn(self) -> AutosaveHandle {
        let stop = Arc::new(CancellationToken::new());
        let saver = self.clone();
        let token = Arc::clone(&stop);

        let task = tokio::spawn(async move {
            debug!(interval = ?saver.interval, "Autosave started");
            while token.sleep(saver.interval).await {
                if let Err(error) = saver.save_now().await {
                    warn!(path = %saver.file.path().display(), error = %error, "Autosave failed");
                }
            }
        });

        AutosaveHandle {
            saver: self,
            stop,
            task,
        }
    }
}

/// A running [`Autosaver`].
#[derive(Debug)]
pub struct AutosaveHandle {
    saver: Autosaver,
    stop: Arc<CancellationToken>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Stops the background loop and writes one final save.
    pub async fn finish(self) -> Result<()> {
        self.stop.cancel("autosave finished");
        if let Err(error) = self.task.await {
            warn!(error = %error, "Autosave task ended abnormally");
        }
        self.saver.save_now().await?;
        info!(
            path = %self.saver.file.path().display(),
            communities = self.saver.graph.len(),
            "Final snapshot saved"
        );
        Ok(())
    }
}
