//! Structured task group for the crawler's worker tasks.

use super::CancellationToken;
use crate::errors::CrawlError;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A group of related tasks sharing one cancellation token.
///
/// The first task that fails with a fatal error cancels the token straight
/// away, so siblings parked on a queue or a backoff sleep wake up without
/// waiting for [`wait`](Self::wait) to reach the failed handle.
pub struct StructuredTaskGroup {
    /// The cancellation token for this group.
    cancel_token: Arc<CancellationToken>,
    /// Handles to spawned tasks.
    handles: RwLock<Vec<(String, JoinHandle<Result<(), CrawlError>>)>>,
}

impl StructuredTaskGroup {
    /// Creates a new task group with its own token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(Arc::new(CancellationToken::new()))
    }

    /// Creates a task group that shares an existing token.
    #[must_use]
    pub fn with_token(cancel_token: Arc<CancellationToken>) -> Self {
        Self {
            cancel_token,
            handles: RwLock::new(Vec::new()),
        }
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Spawns a task in the group.
    pub fn spawn<F, Fut>(&self, name: &str, task: F)
    where
        F: FnOnce(Arc<CancellationToken>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CrawlError>> + Send + 'static,
    {
        let token = self.cancel_token.clone();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let result = task(token.clone()).await;
            if let Err(ref e) = result {
                if e.is_fatal() {
                    error!(task = %task_name, error = %e, "Task failed, cancelling group");
                    token.cancel(e.to_string());
                }
            }
            result
        });

        self.handles.write().push((name.to_string(), handle));
    }

    /// Cancels all tasks in the group.
    pub fn cancel_all(&self, reason: &str) {
        self.cancel_token.cancel(reason);
    }

    /// Waits for all tasks to complete.
    ///
    /// Tasks are collected in completion order. Returns the first fatal
    /// error if any task produced one; non-fatal errors are logged and
    /// otherwise ignored. A panicked task cancels the group.
    pub async fn wait(&self) -> Result<(), CrawlError> {
        let handles: Vec<_> = {
            let mut h = self.handles.write();
            std::mem::take(&mut *h)
        };

        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) })
            .collect();

        let mut first_error: Option<CrawlError> = None;
        while let Some((name, joined)) = pending.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_fatal() => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Ok(Err(e)) => {
                    debug!(task = %name, error = %e, "Task ended with a recoverable error");
                }
                Err(join_error) => {
                    let msg = format!("{name}: {join_error}");
                    self.cancel_token.cancel(&msg);
                    if first_error.is_none() {
                        first_error = Some(CrawlError::Task(msg));
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Returns the number of pending tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.read().len()
    }
}

impl Default for StructuredTaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StructuredTaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredTaskGroup")
            .field("task_count", &self.task_count())
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish()
    }
}
