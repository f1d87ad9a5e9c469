//! Single-flight token refresh.
//!
//! Every caller that asks for a refresh while one is running attaches to the
//! running attempt and receives its result. The attempt runs on its own task,
//! so callers that give up waiting never leave the lock behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::backend::{AuthBackend, RefreshOutcome};
use super::store::TokenStore;

/// Marker for an in-flight refresh. Exists only while the attempt runs.
struct RefreshLock {
    generation: u64,
    shared_result: Shared<BoxFuture<'static, bool>>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    backend: Arc<dyn AuthBackend>,
    lock: Mutex<Option<RefreshLock>>,
    generations: AtomicU64,
}

/// Sole writer of refreshed token pairs.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn TokenStore>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                lock: Mutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain and persist a new token pair.
    ///
    /// Returns `true` only when new tokens were issued and written to the
    /// store. Concurrent callers share one attempt and one result.
    pub async fn refresh(&self) -> bool {
        let shared_result = {
            let mut slot = self.inner.lock.lock().await;
            match slot.as_ref() {
                Some(lock) => {
                    debug!(generation = lock.generation, "Joining in-flight refresh");
                    lock.shared_result.clone()
                }
                None => {
                    let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    let shared_result = self.start(generation);
                    *slot = Some(RefreshLock {
                        generation,
                        shared_result: shared_result.clone(),
                    });
                    shared_result
                }
            }
        };

        shared_result.await
    }

    /// Whether a refresh attempt is currently running.
    pub async fn in_progress(&self) -> bool {
        self.inner.lock.lock().await.is_some()
    }

    fn start(&self, generation: u64) -> Shared<BoxFuture<'static, bool>> {
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let refreshed = inner.attempt(generation).await;
            inner.release(generation).await;
            refreshed
        });

        async move {
            task.await.unwrap_or_else(|e| {
                error!(generation, error = %e, "Refresh task failed");
                false
            })
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn attempt(&self, generation: u64) -> bool {
        let Some(current) = self.store.get().await else {
            info!(generation, "No refresh token stored, skipping refresh");
            return false;
        };

        match self.backend.refresh(&current.refresh).await {
            RefreshOutcome::Success(pair) => match self.store.set(&pair).await {
                Ok(()) => {
                    info!(generation, "Backend tokens refreshed");
                    true
                }
                Err(e) => {
                    error!(generation, error = %e, "Failed to persist refreshed tokens");
                    false
                }
            },
            RefreshOutcome::Rejected => {
                warn!(generation, "Refresh token rejected by backend");
                false
            }
            RefreshOutcome::TransientFailure(reason) => {
                warn!(generation, reason = %reason, "Token refresh failed");
                false
            }
        }
    }

    /// Tear down the lock, unless a newer attempt already replaced it.
    async fn release(&self, generation: u64) {
        let mut slot = self.lock.lock().await;
        if slot.as_ref().is_some_and(|lock| lock.generation == generation) {
            *slot = None;
        }
    }
}
