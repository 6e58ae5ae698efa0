//! BorkResource external client.

use std::sync::Arc;

use tracing::{debug, info};

use super::{
    ExternalClient, ExternalCreation, ExternalDelete, ExternalError, ExternalObservation,
    ExternalUpdate, NoOpService,
};
use crate::apis::{BORK_RESOURCE_KIND, BorkResource, Condition, ConnectionDetails, Managed};
use crate::audit::AuditLogger;
use crate::store::{ResourceStore, StoreError};

fn bork_resource(mg: &mut Managed) -> Result<&mut BorkResource, ExternalError> {
    match mg {
        Managed::Bork(cr) => Ok(cr),
        other => Err(ExternalError::TypeMismatch {
            expected: BORK_RESOURCE_KIND,
            actual: other.kind().to_string(),
        }),
    }
}

/// Reconciles a BorkResource against a no-op external system.
///
/// The only convergence rule: the contended value is overwritten with the
/// authoritative value and the whole resource is written back. There is no
/// lock and no merge, so a concurrent writer of the contended value loses on
/// the next update.
pub struct BorkExternal {
    store: Option<Arc<dyn ResourceStore>>,
    service: Option<NoOpService>,
    audit: Arc<AuditLogger>,
}

impl BorkExternal {
    pub fn new(store: Arc<dyn ResourceStore>, service: NoOpService, audit: Arc<AuditLogger>) -> Self {
        Self {
            store: Some(store),
            service: Some(service),
            audit,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    pub fn service(&self) -> Option<&NoOpService> {
        self.service.as_ref()
    }
}

impl ExternalClient for BorkExternal {
    fn observe(&self, mg: &mut Managed) -> Result<ExternalObservation, ExternalError> {
        let cr = bork_resource(mg)?;

        // The resource is always considered available, drift or not
        cr.status.conditions.set([Condition::available()]);

        let up_to_date = cr.spec.for_provider.is_up_to_date();
        debug!(
            resource = %cr.metadata.key(),
            authoritative = cr.spec.for_provider.authoritative_value,
            contended = cr.spec.for_provider.contended_value,
            up_to_date,
            "Observed BorkResource"
        );

        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            connection_details: ConnectionDetails::new(),
        })
    }

    fn create(&self, mg: &mut Managed) -> Result<ExternalCreation, ExternalError> {
        let cr = bork_resource(mg)?;
        self.audit.creating(cr);

        Ok(ExternalCreation {
            connection_details: ConnectionDetails::new(),
        })
    }

    fn update(&self, mg: &mut Managed) -> Result<ExternalUpdate, ExternalError> {
        let (key, previous, authoritative) = {
            let cr = bork_resource(mg)?;
            let params = cr.spec.for_provider;
            if params.is_up_to_date() {
                // Nothing to do, contended value already matches
                return Ok(ExternalUpdate::default());
            }
            (
                cr.metadata.key(),
                params.contended_value,
                params.authoritative_value,
            )
        };

        let store = self.store.as_ref().ok_or_else(|| {
            ExternalError::PersistenceWrite(StoreError::Unavailable(
                "external client is disconnected".to_string(),
            ))
        })?;

        bork_resource(mg)?.spec.for_provider.contended_value = authoritative;
        store.update(mg).map_err(ExternalError::PersistenceWrite)?;

        info!(
            resource = %key,
            from = previous,
            to = authoritative,
            "Overwrote contended value"
        );
        self.audit.converged(&key, previous, authoritative);

        Ok(ExternalUpdate {
            connection_details: ConnectionDetails::new(),
            overwritten: Some(previous),
        })
    }

    fn delete(&self, mg: &mut Managed) -> Result<ExternalDelete, ExternalError> {
        let cr = bork_resource(mg)?;
        // Nothing external to remove
        self.audit.deleting(cr);
        Ok(ExternalDelete)
    }

    fn disconnect(&mut self) -> Result<(), ExternalError> {
        self.store = None;
        self.service = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{
        ConditionReason, ConditionType, ObjectMeta, ResourceKey, UnstructuredResource,
    };
    use crate::store::MemoryStore;

    fn setup(authoritative: i64, contended: i64) -> (Arc<MemoryStore>, BorkExternal, Managed) {
        let store = Arc::new(MemoryStore::new());
        let obj = store
            .create(BorkResource::new(&ResourceKey::cluster("bork"), authoritative, contended).into())
            .unwrap();
        let external = BorkExternal::new(
            store.clone(),
            NoOpService::default(),
            Arc::new(AuditLogger::new("test")),
        );
        (store, external, obj)
    }

    fn params(mg: &Managed) -> (i64, i64) {
        let p = mg.as_bork().unwrap().spec.for_provider;
        (p.authoritative_value, p.contended_value)
    }

    #[test]
    fn test_observe_reports_drift_and_availability() {
        let (_, external, mut obj) = setup(2, 1);

        let observation = external.observe(&mut obj).unwrap();
        assert!(observation.resource_exists);
        assert!(!observation.resource_up_to_date);
        assert!(observation.connection_details.is_empty());

        let ready = obj
            .as_bork()
            .unwrap()
            .status
            .conditions
            .get(ConditionType::Ready)
            .cloned()
            .unwrap();
        assert_eq!(ready.reason, ConditionReason::Available);
    }

    #[test]
    fn test_observe_does_not_touch_spec() {
        for (a, c) in [(2, 1), (5, 5), (-1, 7)] {
            let (_, external, mut obj) = setup(a, c);
            external.observe(&mut obj).unwrap();
            assert_eq!(params(&obj), (a, c));
        }
    }

    #[test]
    fn test_update_converges() {
        let (store, external, mut obj) = setup(2, 1);

        let result = external.update(&mut obj).unwrap();
        assert_eq!(result.overwritten, Some(1));
        assert_eq!(params(&obj), (2, 2));

        let stored = store.get(&ResourceKey::cluster("bork")).unwrap().unwrap();
        assert_eq!(params(&stored), (2, 2));
    }

    #[test]
    fn test_update_up_to_date_is_noop() {
        let (store, external, mut obj) = setup(5, 5);
        let version = obj.meta().resource_version;

        let result = external.update(&mut obj).unwrap();
        assert!(result.is_noop());
        assert_eq!(result, ExternalUpdate::default());

        let stored = store.get(&ResourceKey::cluster("bork")).unwrap().unwrap();
        assert_eq!(stored.meta().resource_version, version);
    }

    #[test]
    fn test_update_write_failure() {
        let (store, external, mut obj) = setup(2, 1);
        store.delete(&ResourceKey::cluster("bork")).unwrap();

        let err = external.update(&mut obj).unwrap_err();
        assert!(matches!(
            err,
            ExternalError::PersistenceWrite(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_and_delete_only_emit() {
        let (store, external, mut obj) = setup(2, 1);
        let audit = external.audit.clone();
        let version = obj.meta().resource_version;

        external.create(&mut obj).unwrap();
        external.delete(&mut obj).unwrap();

        assert_eq!(params(&obj), (2, 1));
        let stored = store.get(&ResourceKey::cluster("bork")).unwrap().unwrap();
        assert_eq!(stored.meta().resource_version, version);

        let messages: Vec<String> = audit.events().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec![
                "Creating: bork (authoritative=2, contended=1)",
                "Deleting: bork (authoritative=2, contended=1)",
            ]
        );
    }

    #[test]
    fn test_wrong_kind_is_rejected_by_every_operation() {
        let (store, external, _) = setup(2, 1);
        let mut widget = Managed::Unstructured(UnstructuredResource {
            kind: "Widget".to_string(),
            metadata: ObjectMeta::new(&ResourceKey::cluster("widget")),
            spec: serde_json::json!({ "size": 1 }),
        });
        let mut events = store.subscribe();

        assert!(matches!(
            external.observe(&mut widget),
            Err(ExternalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            external.create(&mut widget),
            Err(ExternalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            external.update(&mut widget),
            Err(ExternalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            external.delete(&mut widget),
            Err(ExternalError::TypeMismatch { .. })
        ));

        assert!(events.try_recv().is_err());
        assert!(external.audit.events().is_empty());
    }

    #[test]
    fn test_disconnect() {
        let (_, mut external, mut obj) = setup(2, 1);
        assert!(external.is_connected());
        external.disconnect().unwrap();
        assert!(!external.is_connected());

        // Observing needs no handles, writing does
        external.observe(&mut obj).unwrap();
        assert!(matches!(
            external.update(&mut obj),
            Err(ExternalError::PersistenceWrite(StoreError::Unavailable(_)))
        ));
    }
}
