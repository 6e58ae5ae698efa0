//! Managed resource reconciler.
//!
//! One call to [`ManagedReconciler::reconcile`] is one tick of the control
//! loop for one resource: read it, connect, observe, then create, update, or
//! delete, and persist the resulting status. The caller guarantees that a
//! key is never reconciled twice at the same time.

mod error;

pub use error::ReconcileError;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::apis::{BORK_RESOURCE_KIND, Condition, ConnectionDetails, Managed, ResourceKey};
use crate::audit::AuditLogger;
use crate::external::{Connector, ExternalClient, ExternalError};
use crate::store::{ResourceStore, StoreError};

/// Finalizer held on every resource this provider manages.
pub const FINALIZER: &str = "finalizer.managedresource.bork.crossplane.io";

/// Resources carrying this annotation with value `"true"` are left alone.
pub const ANNOTATION_PAUSED: &str = "bork.crossplane.io/paused";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

/// When the resource should be looked at again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Only a watched change brings it back.
    Never,
    After(Duration),
}

/// What a successful reconcile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The resource no longer exists.
    Gone,
    Paused,
    Created,
    /// The contended value was overwritten, or nothing needed writing.
    Updated { overwritten: Option<i64> },
    UpToDate,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub action: Action,
    pub requeue: Requeue,
}

struct Converged {
    action: Action,
    connection_details: ConnectionDetails,
}

fn set_conditions(mg: &mut Managed, conditions: impl IntoIterator<Item = Condition>) {
    if let Some(cr) = mg.as_bork_mut() {
        cr.status.conditions.set(conditions);
    }
}

fn is_paused(mg: &Managed) -> bool {
    mg.meta().annotation(ANNOTATION_PAUSED) == Some("true")
}

async fn blocking<T, F>(f: F) -> Result<T, ReconcileError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReconcileError::Join(e.to_string()))
}

/// Observe, then act on the observation. Runs to completion on a blocking
/// thread.
fn converge(
    external: &dyn ExternalClient,
    mg: &mut Managed,
    deleting: bool,
) -> Result<Converged, ReconcileError> {
    let observation = external.observe(mg).map_err(ReconcileError::Observe)?;
    let mut connection_details = observation.connection_details;

    if deleting {
        if observation.resource_exists {
            set_conditions(mg, [Condition::deleting()]);
            external.delete(mg).map_err(ReconcileError::Delete)?;
        }
        return Ok(Converged {
            action: Action::Deleted,
            connection_details,
        });
    }

    if !observation.resource_exists {
        set_conditions(mg, [Condition::creating()]);
        let creation = external.create(mg).map_err(ReconcileError::Create)?;
        connection_details.extend(creation.connection_details);
        return Ok(Converged {
            action: Action::Created,
            connection_details,
        });
    }

    if !observation.resource_up_to_date {
        let update = external.update(mg).map_err(ReconcileError::Update)?;
        connection_details.extend(update.connection_details);
        return Ok(Converged {
            action: Action::Updated {
                overwritten: update.overwritten,
            },
            connection_details,
        });
    }

    Ok(Converged {
        action: Action::UpToDate,
        connection_details,
    })
}

/// Reconciles managed resources of one kind.
pub struct ManagedReconciler {
    store: Arc<dyn ResourceStore>,
    connector: Arc<dyn Connector>,
    audit: Arc<AuditLogger>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ManagedReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        connector: Arc<dyn Connector>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            connector,
            audit,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<Managed>, ReconcileError> {
        let store = self.store.clone();
        let key = key.clone();
        blocking(move || store.get(&key))
            .await?
            .map_err(ReconcileError::Get)
    }

    async fn write(&self, mut mg: Managed) -> Result<(Managed, Result<(), StoreError>), ReconcileError> {
        let store = self.store.clone();
        blocking(move || {
            let result = store.update(&mut mg);
            (mg, result)
        })
        .await
    }

    async fn write_status(&self, mut mg: Managed) -> Result<Managed, ReconcileError> {
        let store = self.store.clone();
        let (mg, result) = blocking(move || {
            let result = store.update_status(&mut mg);
            (mg, result)
        })
        .await?;
        result.map_err(ReconcileError::UpdateStatus)?;
        Ok(mg)
    }

    /// Record a failed reconcile on the resource and hand the error back.
    async fn fail(&self, mut mg: Managed, error: ReconcileError) -> ReconcileError {
        let key = mg.key();
        self.audit.reconcile_failed(&key, &error.to_string());
        set_conditions(&mut mg, [Condition::reconcile_error(error.to_string())]);
        if let Err(e) = self.write_status(mg).await {
            warn!(resource = %key, error = %e, "Cannot record reconcile error");
        }
        error
    }

    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Reconciled, ReconcileError> {
        let Some(mut mg) = self.get(key).await? else {
            debug!(resource = %key, "Managed resource is gone");
            return Ok(Reconciled {
                action: Action::Gone,
                requeue: Requeue::Never,
            });
        };

        // Nothing is written to a resource of a kind this provider does not own
        if mg.as_bork().is_none() {
            let error = ReconcileError::Observe(ExternalError::TypeMismatch {
                expected: BORK_RESOURCE_KIND,
                actual: mg.kind().to_string(),
            });
            self.audit.reconcile_failed(key, &error.to_string());
            return Err(error);
        }

        if is_paused(&mg) {
            debug!(resource = %key, "Reconciliation is paused");
            set_conditions(&mut mg, [Condition::reconcile_paused()]);
            self.write_status(mg).await?;
            return Ok(Reconciled {
                action: Action::Paused,
                requeue: Requeue::After(self.poll_interval),
            });
        }

        let deleting = mg.meta().is_being_deleted();
        if !deleting && mg.meta_mut().add_finalizer(FINALIZER) {
            let (written, result) = self.write(mg).await?;
            mg = written;
            if let Err(e) = result {
                return Err(self.fail(mg, ReconcileError::AddFinalizer(e)).await);
            }
        }

        let connected = self.connector.connect(&mg).await;
        let external = match connected {
            Ok(external) => external,
            Err(e) => {
                self.audit.connect_failed(key, &e.to_string());
                return Err(self.fail(mg, e.into()).await);
            }
        };

        let mut task = tokio::task::spawn_blocking(move || {
            let mut external = external;
            let outcome = converge(external.as_ref(), &mut mg, deleting);
            if let Err(e) = external.disconnect() {
                warn!(error = %e, "Cannot disconnect external client");
            }
            (mg, outcome)
        });
        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                // A blocking engine cannot be interrupted. The key stays held
                // until it returns so no second reconcile overlaps its writes.
                warn!(resource = %key, timeout = ?self.timeout, "Reconcile timed out, waiting for the engine to return");
                let (mg, _) = task
                    .await
                    .map_err(|e| ReconcileError::Join(e.to_string()))?;
                return Err(self.fail(mg, ReconcileError::Timeout(self.timeout)).await);
            }
        };
        let (mut mg, outcome) = joined.map_err(|e| ReconcileError::Join(e.to_string()))?;

        let converged = match outcome {
            Ok(converged) => converged,
            Err(e) => return Err(self.fail(mg, e).await),
        };

        if deleting {
            mg.meta_mut().remove_finalizer(FINALIZER);
            let (mg, result) = self.write(mg).await?;
            if let Err(e) = result {
                return Err(self.fail(mg, ReconcileError::RemoveFinalizer(e)).await);
            }
            self.audit.finalized(key);
            return Ok(Reconciled {
                action: Action::Deleted,
                requeue: Requeue::Never,
            });
        }

        if let Some(cr) = mg.as_bork_mut() {
            cr.status
                .connection_details
                .extend(converged.connection_details);
        }
        set_conditions(&mut mg, [Condition::reconcile_success()]);
        self.write_status(mg).await?;

        match converged.action {
            Action::Updated {
                overwritten: Some(previous),
            } => info!(resource = %key, previous, "Reconciled drifted resource"),
            action => debug!(resource = %key, ?action, "Reconciled"),
        }

        Ok(Reconciled {
            action: converged.action,
            requeue: Requeue::After(self.poll_interval),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{BorkResource, ConditionReason, ConditionType};
    use crate::external::{NoOpConnector, noop_service_factory};
    use crate::store::MemoryStore;

    fn reconciler(store: Arc<MemoryStore>) -> ManagedReconciler {
        let audit = Arc::new(AuditLogger::new("test"));
        let connector = Arc::new(NoOpConnector::new(
            store.clone(),
            noop_service_factory(),
            audit.clone(),
        ));
        ManagedReconciler::new(store, connector, audit)
            .with_poll_interval(Duration::from_secs(5))
    }

    fn synced_reason(store: &MemoryStore, key: &ResourceKey) -> ConditionReason {
        store
            .get(key)
            .unwrap()
            .unwrap()
            .as_bork()
            .unwrap()
            .status
            .conditions
            .get(ConditionType::Synced)
            .unwrap()
            .reason
    }

    #[tokio::test]
    async fn test_reconcile_drifted_resource() {
        let store = Arc::new(MemoryStore::new());
        let key = ResourceKey::cluster("a");
        store.create(BorkResource::new(&key, 2, 1).into()).unwrap();

        let reconciled = reconciler(store.clone()).reconcile(&key).await.unwrap();
        assert_eq!(
            reconciled,
            Reconciled {
                action: Action::Updated {
                    overwritten: Some(1)
                },
                requeue: Requeue::After(Duration::from_secs(5)),
            }
        );

        let stored = store.get(&key).unwrap().unwrap();
        let cr = stored.as_bork().unwrap();
        assert_eq!(cr.spec.for_provider.contended_value, 2);
        assert!(cr.metadata.has_finalizer(FINALIZER));
        assert_eq!(
            cr.status.conditions.get(ConditionType::Ready).unwrap().reason,
            ConditionReason::Available
        );
        assert_eq!(synced_reason(&store, &key), ConditionReason::ReconcileSuccess);
    }

    #[tokio::test]
    async fn test_reconcile_up_to_date() {
        let store = Arc::new(MemoryStore::new());
        let key = ResourceKey::cluster("a");
        store.create(BorkResource::new(&key, 5, 5).into()).unwrap();

        let reconciled = reconciler(store).reconcile(&key).await.unwrap();
        assert_eq!(reconciled.action, Action::UpToDate);
    }

    #[tokio::test]
    async fn test_reconcile_missing_resource() {
        let store = Arc::new(MemoryStore::new());
        let reconciled = reconciler(store)
            .reconcile(&ResourceKey::cluster("nope"))
            .await
            .unwrap();
        assert_eq!(reconciled.action, Action::Gone);
        assert_eq!(reconciled.requeue, Requeue::Never);
    }

    #[tokio::test]
    async fn test_reconcile_paused() {
        let store = Arc::new(MemoryStore::new());
        let key = ResourceKey::cluster("a");
        let mut cr = BorkResource::new(&key, 2, 1);
        cr.metadata
            .annotations
            .insert(ANNOTATION_PAUSED.to_string(), "true".to_string());
        store.create(cr.into()).unwrap();

        let reconciled = reconciler(store.clone()).reconcile(&key).await.unwrap();
        assert_eq!(
            reconciled,
            Reconciled {
                action: Action::Paused,
                requeue: Requeue::After(Duration::from_secs(5)),
            }
        );

        let stored = store.get(&key).unwrap().unwrap();
        assert_eq!(
            stored.as_bork().unwrap().spec.for_provider.contended_value,
            1
        );
        assert_eq!(synced_reason(&store, &key), ConditionReason::ReconcilePaused);
    }

    #[tokio::test]
    async fn test_reconcile_deletion_releases_finalizer() {
        let store = Arc::new(MemoryStore::new());
        let key = ResourceKey::cluster("a");
        store.create(BorkResource::new(&key, 2, 1).into()).unwrap();
        let reconciler = reconciler(store.clone());

        reconciler.reconcile(&key).await.unwrap();
        store.delete(&key).unwrap();
        assert!(store.get(&key).unwrap().is_some());

        let reconciled = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(reconciled.action, Action::Deleted);
        assert!(store.get(&key).unwrap().is_none());
    }
}
