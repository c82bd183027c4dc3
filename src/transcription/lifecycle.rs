//! # Provider Lifecycle
//!
//! Lazy, single-flight initialization of expensive provider backends (model weights,
//! HTTP clients, tokenizers).
//!
//! ## State Transitions:
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready
//!                        │
//!                        ▼
//!                     Failed ──(next call retries)──▶ Initializing
//! ```
//!
//! ## Guarantees:
//! - Any number of concurrent callers trigger exactly one initialization attempt
//! - Every caller waiting on an attempt observes the same outcome
//! - A caller that gives up waiting does not cancel the attempt for the others
//! - The attempt records its own outcome, so the state moves on even when nobody is waiting
//! - A failed attempt is remembered, and the next call starts a fresh one
//!
//! ## Rust Concepts:
//! - **`Shared` futures**: one spawned init task, many awaiters, each getting a clone of the result
//! - **Short critical sections**: the slot mutex is never held across an `.await`

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{ProviderError, SharedError};

/// Where a provider is in its initialization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl ProviderState {
    /// Human-readable status description.
    pub fn description(&self) -> &'static str {
        match self {
            ProviderState::Uninitialized => "Not initialized yet, loads on first use",
            ProviderState::Initializing => "Initialization in progress",
            ProviderState::Ready => "Ready for transcription",
            ProviderState::Failed => "Last initialization failed, next request retries",
        }
    }
}

type InitOutcome<B> = Result<Arc<B>, SharedError>;
type InitFuture<B> = Shared<BoxFuture<'static, InitOutcome<B>>>;

enum Slot<B> {
    Uninitialized,
    Initializing { attempt: u64, future: InitFuture<B> },
    Ready(Arc<B>),
    Failed(SharedError),
}

/// Holds a backend of type `B` that is built at most once per successful attempt.
pub struct LazyBackend<B> {
    provider: String,
    slot: Arc<Mutex<Slot<B>>>,
    attempts: AtomicU64,
}

impl<B> LazyBackend<B>
where
    B: Send + Sync + 'static,
{
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            slot: Arc::new(Mutex::new(Slot::Uninitialized)),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ProviderState {
        match &*self.lock() {
            Slot::Uninitialized => ProviderState::Uninitialized,
            Slot::Initializing { .. } => ProviderState::Initializing,
            Slot::Ready(_) => ProviderState::Ready,
            Slot::Failed(_) => ProviderState::Failed,
        }
    }

    /// How many initialization attempts have been started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The backend, if it is ready. Never starts initialization.
    pub fn get(&self) -> Option<Arc<B>> {
        match &*self.lock() {
            Slot::Ready(backend) => Some(Arc::clone(backend)),
            _ => None,
        }
    }

    /// The backend, if it is ready, or [`ProviderError::NotInitialized`].
    pub fn require(&self) -> Result<Arc<B>, ProviderError> {
        self.get().ok_or_else(|| ProviderError::NotInitialized {
            provider: self.provider.clone(),
        })
    }

    /// Return the ready backend, joining or starting an initialization attempt if needed.
    ///
    /// `init` is only called when no attempt is in flight and none has succeeded.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<B>, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    {
        let (attempt, future) = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(backend) => return Ok(Arc::clone(backend)),
                Slot::Initializing { attempt, future } => {
                    debug!(provider = %self.provider, attempt, "Joining in-flight initialization");
                    (*attempt, future.clone())
                }
                Slot::Uninitialized | Slot::Failed(_) => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(provider = %self.provider, attempt, "Initializing provider backend");

                    let init = init();
                    let weak_slot = Arc::downgrade(&self.slot);
                    let provider = self.provider.clone();
                    let task = tokio::spawn(async move {
                        let outcome: InitOutcome<B> = match AssertUnwindSafe(init).catch_unwind().await {
                            Ok(Ok(backend)) => Ok(Arc::new(backend)),
                            Ok(Err(error)) => {
                                let boxed: Box<dyn std::error::Error + Send + Sync> = error.into();
                                Err(SharedError::from(boxed))
                            }
                            Err(_) => {
                                let boxed: Box<dyn std::error::Error + Send + Sync> =
                                    "provider initialization panicked".into();
                                Err(SharedError::from(boxed))
                            }
                        };
                        if let Some(slot) = weak_slot.upgrade() {
                            settle(&slot, &provider, attempt, &outcome);
                        }
                        outcome
                    });
                    let future: InitFuture<B> = async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(join_error) => Err(Arc::new(join_error) as SharedError),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Slot::Initializing {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;
        settle(&self.slot, &self.provider, attempt, &outcome);

        outcome.map_err(|source| ProviderError::Initialization {
            provider: self.provider.clone(),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot<B>> {
        lock_slot(&self.slot)
    }
}

fn lock_slot<B>(slot: &Mutex<Slot<B>>) -> MutexGuard<'_, Slot<B>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record the outcome of `attempt`, unless it was already recorded or a newer attempt replaced it.
fn settle<B>(slot: &Mutex<Slot<B>>, provider: &str, attempt: u64, outcome: &InitOutcome<B>) {
    let mut slot = lock_slot(slot);
    let current = match &*slot {
        Slot::Initializing { attempt: current, .. } => *current,
        _ => return,
    };
    if current != attempt {
        return;
    }

    *slot = match outcome {
        Ok(backend) => {
            info!(provider, attempt, "Provider backend ready");
            Slot::Ready(Arc::clone(backend))
        }
        Err(error) => {
            warn!(provider, attempt, error = %error, "Provider initialization failed");
            Slot::Failed(Arc::clone(error))
        }
    };
}
