use crate::entry::{run_guarded, LedgerEntry};
use crate::error::{LedgerError, Result};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_WORKERS: usize = 4;

/// Worker pool for analysis bodies. At most `workers` scheduled futures run at once; the rest
/// wait for a permit in submission order.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_WORKERS)
    }
}

impl TaskQueue {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn schedule<F>(&self, work: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        let inner = tokio::spawn(async move {
            // The semaphore is never closed, so a failed acquire only means running unbounded.
            let _permit = permits.acquire_owned().await.ok();
            work.await
        });
        TaskHandle { inner }
    }

    /// Schedule `body` under [`run_guarded`], so the entry completes however the body ends.
    pub fn schedule_guarded<F, T, E>(&self, entry: LedgerEntry, body: F) -> TaskHandle<Option<T>>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.schedule(run_guarded(entry, body))
    }
}

/// Handle to scheduled work. Dropping it detaches the work; it keeps running.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub async fn join(self) -> Result<T> {
        self.inner
            .await
            .map_err(|e| LedgerError::TaskPanicked(e.to_string()))
    }
}
