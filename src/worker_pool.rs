//! # Worker Pool
//!
//! Bounded pool for CPU-heavy work (decoding, resampling, local inference).
//!
//! Jobs run on tokio's blocking thread pool so the async runtime stays responsive, while a
//! semaphore caps how many of them run at once at the configured worker count.
//!
//! ## Rust Concepts:
//! - **Owned permits**: the permit moves into the blocking closure, so capacity is only
//!   released when the job really finishes, even if the caller stopped waiting
//! - **`JoinError`**: a panicking job surfaces as an error instead of tearing down the server

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Failures of the pool itself, as opposed to failures of the job it ran.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool is shut down, cannot run {stage}")]
    Closed { stage: &'static str },

    #[error("{stage} worker failed: {source}")]
    Failed {
        stage: &'static str,
        #[source]
        source: JoinError,
    },
}

/// Semaphore-bounded front for `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at a time (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of idle worker slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a worker slot is free.
    pub async fn run<F, R>(&self, stage: &'static str, job: F) -> Result<R, WorkerError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Closed { stage })?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|source| WorkerError::Failed { stage, source })
    }

    /// Stop accepting new jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
