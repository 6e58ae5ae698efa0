//! In-memory ResourceStore.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::apis::{Managed, ResourceKey};

use super::error::{Result, StoreError};
use super::event::StoreEvent;
use super::traits::ResourceStore;

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    objects: HashMap<ResourceKey, Managed>,
    /// Last assigned resource version, shared by all objects.
    version: u64,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Process-local store holding at most one object per key.
pub struct MemoryStore {
    state: RwLock<State>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            event_tx,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Internal("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Internal("store lock poisoned".to_string()))
    }

    fn emit(&self, event: StoreEvent) {
        debug!(?event, "Store event");
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl ResourceStore for MemoryStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<Managed>> {
        Ok(self.read()?.objects.get(key).cloned())
    }

    fn list(&self, kind: &str) -> Result<Vec<Managed>> {
        let state = self.read()?;
        let mut objects: Vec<Managed> = state
            .objects
            .values()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect();
        objects.sort_by_key(Managed::key);
        Ok(objects)
    }

    fn create(&self, mut obj: Managed) -> Result<Managed> {
        let key = obj.key();
        let kind = obj.kind().to_string();
        {
            let mut state = self.write()?;
            if state.objects.contains_key(&key) {
                return Err(StoreError::AlreadyExists(key));
            }
            let version = state.next_version();
            let meta = obj.meta_mut();
            meta.generation = 1;
            meta.resource_version = version;
            meta.deletion_timestamp = None;
            state.objects.insert(key.clone(), obj.clone());
        }
        self.emit(StoreEvent::Created { key, kind });
        Ok(obj)
    }

    fn update(&self, obj: &mut Managed) -> Result<()> {
        let key = obj.key();
        let kind = obj.kind().to_string();
        let event = {
            let mut state = self.write()?;
            let current = state
                .objects
                .get(&key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            let spec_changed = current.spec_differs(obj);
            let annotations_changed = current.meta().annotations != obj.meta().annotations;
            let current_meta = current.meta().clone();
            let version = state.next_version();

            let meta = obj.meta_mut();
            meta.uid = current_meta.uid;
            meta.creation_timestamp = current_meta.creation_timestamp;
            // Deletion cannot be undone by a write
            if current_meta.deletion_timestamp.is_some() {
                meta.deletion_timestamp = current_meta.deletion_timestamp;
            }
            meta.generation = current_meta.generation + u64::from(spec_changed);
            meta.resource_version = version;

            if meta.is_being_deleted() && meta.finalizers.is_empty() {
                state.objects.remove(&key);
                StoreEvent::Deleted { key, kind }
            } else {
                let deleting = meta.is_being_deleted();
                state.objects.insert(key.clone(), obj.clone());
                StoreEvent::Updated {
                    key,
                    kind,
                    spec_changed,
                    annotations_changed,
                    deleting,
                }
            }
        };
        self.emit(event);
        Ok(())
    }

    fn update_status(&self, obj: &mut Managed) -> Result<()> {
        let key = obj.key();
        let kind = obj.kind().to_string();
        {
            let mut state = self.write()?;
            let version = state.next_version();
            let current = state
                .objects
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            match (current, &*obj) {
                (Managed::Bork(stored), Managed::Bork(incoming)) => {
                    stored.status = incoming.status.clone();
                    stored.metadata.resource_version = version;
                }
                (Managed::Unstructured(stored), Managed::Unstructured(_)) => {
                    stored.metadata.resource_version = version;
                }
                (stored, _) => {
                    return Err(StoreError::Internal(format!(
                        "status write for {} does not match stored kind {}",
                        key,
                        stored.kind()
                    )));
                }
            }
            obj.meta_mut().resource_version = version;
        }
        self.emit(StoreEvent::StatusUpdated { key, kind });
        Ok(())
    }

    fn delete(&self, key: &ResourceKey) -> Result<()> {
        let event = {
            let mut state = self.write()?;
            let version = state.next_version();
            let obj = state
                .objects
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            let kind = obj.kind().to_string();

            if obj.meta().finalizers.is_empty() {
                state.objects.remove(key);
                StoreEvent::Deleted {
                    key: key.clone(),
                    kind,
                }
            } else {
                let meta = obj.meta_mut();
                if meta.deletion_timestamp.is_none() {
                    meta.deletion_timestamp = Some(Utc::now());
                }
                meta.resource_version = version;
                StoreEvent::Updated {
                    key: key.clone(),
                    kind,
                    spec_changed: false,
                    annotations_changed: false,
                    deleting: true,
                }
            }
        };
        self.emit(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }
}
