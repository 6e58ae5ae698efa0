#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use provider_bork::apis::{ConditionType, Condition};
use provider_bork::audit::AuditLogger;
use provider_bork::external::{NoOpConnector, noop_service_factory};
use provider_bork::store::{MemoryStore, Result, ResourceStore, StoreError, StoreEvent};
use provider_bork::{BorkResource, Managed, ManagedReconciler, ResourceKey};
use tokio::sync::broadcast;

/// Who performed a recorded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Provider,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub writer: Writer,
    pub key: ResourceKey,
    pub contended: Option<i64>,
}

type Hook = Box<dyn FnOnce(&RecordingStore) + Send>;

/// MemoryStore wrapper that records every whole-object write and can run a
/// hook right before the next one.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<RecordedWrite>>,
    before_update: Mutex<Option<Hook>>,
    fail_updates: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Run `hook` right before the next `update` reaches the store.
    pub fn before_next_update(&self, hook: impl FnOnce(&RecordingStore) + Send + 'static) {
        *self.before_update.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Read-modify-write of the contended value by an independent writer.
    pub fn external_write(&self, key: &ResourceKey, contended: i64) {
        let mut obj = self.inner.get(key).unwrap().unwrap();
        obj.as_bork_mut().unwrap().spec.for_provider.contended_value = contended;
        self.record(Writer::External, &obj);
        self.inner.update(&mut obj).unwrap();
    }

    fn record(&self, writer: Writer, obj: &Managed) {
        self.writes.lock().unwrap().push(RecordedWrite {
            writer,
            key: obj.key(),
            contended: obj.as_bork().map(|cr| cr.spec.for_provider.contended_value),
        });
    }
}

impl ResourceStore for RecordingStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<Managed>> {
        self.inner.get(key)
    }

    fn list(&self, kind: &str) -> Result<Vec<Managed>> {
        self.inner.list(kind)
    }

    fn create(&self, obj: Managed) -> Result<Managed> {
        self.inner.create(obj)
    }

    fn update(&self, obj: &mut Managed) -> Result<()> {
        let hook = self.before_update.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self);
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        self.record(Writer::Provider, obj);
        self.inner.update(obj)
    }

    fn update_status(&self, obj: &mut Managed) -> Result<()> {
        self.inner.update_status(obj)
    }

    fn delete(&self, key: &ResourceKey) -> Result<()> {
        self.inner.delete(key)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}

pub fn bork(name: &str, authoritative: i64, contended: i64) -> Managed {
    BorkResource::new(&ResourceKey::cluster(name), authoritative, contended).into()
}

pub fn contended(store: &dyn ResourceStore, key: &ResourceKey) -> i64 {
    store
        .get(key)
        .unwrap()
        .unwrap()
        .as_bork()
        .unwrap()
        .spec
        .for_provider
        .contended_value
}

pub fn condition(store: &dyn ResourceStore, key: &ResourceKey, type_: ConditionType) -> Condition {
    store
        .get(key)
        .unwrap()
        .unwrap()
        .as_bork()
        .unwrap()
        .status
        .conditions
        .get(type_)
        .cloned()
        .unwrap()
}

pub fn noop_connector(store: Arc<dyn ResourceStore>, audit: Arc<AuditLogger>) -> Arc<NoOpConnector> {
    Arc::new(NoOpConnector::new(store, noop_service_factory(), audit))
}

pub fn reconciler(store: Arc<dyn ResourceStore>, audit: Arc<AuditLogger>) -> ManagedReconciler {
    let connector = noop_connector(store.clone(), audit.clone());
    ManagedReconciler::new(store, connector, audit)
}
