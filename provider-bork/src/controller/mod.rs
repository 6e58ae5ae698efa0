//! Controller driving [`ManagedReconciler`] for every resource of one kind.
//!
//! ```text
//! store.list()  ──┐
//! store events ───┼─→ WorkQueue ─→ workers ─→ reconcile(key)
//! poll/backoff ───┘        ↑                        │
//!                          └──── add_after ─────────┘
//! ```

mod limiter;
mod queue;

pub use limiter::{Backoff, RateLimiter};
pub use queue::WorkQueue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::apis::ResourceKey;
use crate::managed::{DEFAULT_POLL_INTERVAL, DEFAULT_RECONCILE_TIMEOUT, ManagedReconciler, Requeue};
use crate::store::{ResourceStore, StoreError};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// How often an in-sync resource is looked at again.
    pub poll_interval: Duration,
    /// Number of concurrent reconciles.
    pub workers: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Reconciles started per second across all workers. Zero is unlimited.
    pub max_reconcile_rate: u32,
    pub reconcile_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            workers: 4,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            max_reconcile_rate: 10,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

/// Shared between the watcher and the workers.
struct Shared {
    reconciler: ManagedReconciler,
    queue: Arc<WorkQueue<ResourceKey>>,
    backoff: Backoff<ResourceKey>,
    limiter: RateLimiter,
    poll_interval: Duration,
}

pub struct Controller {
    kind: String,
    store: Arc<dyn ResourceStore>,
    reconciler: ManagedReconciler,
    options: ControllerOptions,
}

impl Controller {
    /// The reconciler is configured from `options`.
    pub fn new(
        kind: &str,
        store: Arc<dyn ResourceStore>,
        reconciler: ManagedReconciler,
        options: ControllerOptions,
    ) -> Self {
        let reconciler = reconciler
            .with_poll_interval(options.poll_interval)
            .with_timeout(options.reconcile_timeout);
        Self {
            kind: kind.to_string(),
            store,
            reconciler,
            options,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// In-flight reconciles finish before this returns; queued keys are
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        let Controller {
            kind,
            store,
            reconciler,
            options,
        } = self;

        let shared = Arc::new(Shared {
            reconciler,
            queue: Arc::new(WorkQueue::new()),
            backoff: Backoff::new(options.backoff_base, options.backoff_max),
            limiter: RateLimiter::new(options.max_reconcile_rate),
            poll_interval: options.poll_interval,
        });

        // Subscribe before listing so nothing falls between the two
        let mut events = store.subscribe();
        let listed = enqueue_all(&store, &kind, &shared.queue).await?;
        info!(kind = %kind, resources = listed, workers = options.workers, "Controller started");

        let mut workers = JoinSet::new();
        for id in 0..options.workers.max(1) {
            workers.spawn(worker(id, shared.clone()));
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if event.kind() == kind && event.changes_desired_state() {
                            debug!(resource = %event.key(), "Change observed");
                            shared.queue.add(event.key().clone());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Store events lagged, resyncing");
                        if let Err(e) = enqueue_all(&store, &kind, &shared.queue).await {
                            error!(error = %e, "Resync failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Store event stream closed");
                        break;
                    }
                },
            }
        }

        info!(kind = %kind, "Controller shutting down");
        shared.queue.shutdown();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker panicked");
            }
        }
        info!(kind = %kind, "Controller stopped");
        Ok(())
    }
}

async fn enqueue_all(
    store: &Arc<dyn ResourceStore>,
    kind: &str,
    queue: &WorkQueue<ResourceKey>,
) -> Result<usize, StoreError> {
    let list_store = store.clone();
    let list_kind = kind.to_string();
    let objects = tokio::task::spawn_blocking(move || list_store.list(&list_kind))
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))??;

    let count = objects.len();
    for obj in objects {
        queue.add(obj.key());
    }
    Ok(count)
}

async fn worker(id: usize, shared: Arc<Shared>) {
    debug!(worker = id, "Worker started");
    while let Some(key) = shared.queue.get().await {
        shared.limiter.acquire().await;

        match shared.reconciler.reconcile(&key).await {
            Ok(reconciled) => {
                shared.backoff.forget(&key);
                if let Requeue::After(delay) = reconciled.requeue {
                    shared.queue.add_after(key.clone(), delay);
                }
            }
            Err(e) if e.is_retryable() => {
                let delay = shared.backoff.when(key.clone());
                warn!(worker = id, resource = %key, error = %e, retry_in = ?delay, "Reconcile failed");
                shared.queue.add_after(key.clone(), delay);
            }
            Err(e) => {
                shared.backoff.forget(&key);
                error!(worker = id, resource = %key, error = %e, "Reconcile failed, not retrying before next poll");
                shared.queue.add_after(key.clone(), shared.poll_interval);
            }
        }

        shared.queue.done(&key);
    }
    debug!(worker = id, "Worker stopped");
}
