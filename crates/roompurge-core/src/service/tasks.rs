//! Supervisor for detached background work.
//!
//! Work spawned here outlives the request that started it but not the
//! process: every task gets a child of the shutdown token and is tracked so
//! shutdown can wait for in-flight work to drain.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle for spawning tracked, cancellable background tasks.
///
/// Cheap to clone; clones share the tracker and the token.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl BackgroundTasks {
    /// Create a supervisor whose tasks are cancelled when `shutdown` is.
    pub fn new(shutdown: &CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: shutdown.child_token(),
        }
    }

    /// Spawn `work` detached from the caller.
    ///
    /// The task is dropped at its next await point once the supervisor is
    /// cancelled.
    pub fn spawn<F>(&self, name: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(task = name, "background task cancelled");
                }
                _ = work => {}
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks still running.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished, without cancelling.
    #[cfg(test)]
    pub(crate) async fn wait_idle(&self) {
        while !self.tracker.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop accepting work and give in-flight tasks `grace` to finish
    /// before cancelling them.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "background tasks still running after grace period, cancelling"
            );
            self.token.cancel();
            self.tracker.wait().await;
        }
    }
}
