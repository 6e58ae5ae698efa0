//! ResourceStore trait definition.
//!
//! The trait hides the persistence client so the reconciliation engine works
//! with whole objects only. Every call is synchronous and bounded; async
//! callers go through `spawn_blocking`.

use tokio::sync::broadcast;

use crate::apis::{Managed, ResourceKey};

use super::error::Result;
use super::event::StoreEvent;

/// Read current state / write full state.
///
/// Writes are flat overwrites resolved last-writer-wins: there is no
/// optimistic concurrency check and no merge.
pub trait ResourceStore: Send + Sync {
    /// Get an object by key.
    fn get(&self, key: &ResourceKey) -> Result<Option<Managed>>;

    /// List all objects of a kind.
    fn list(&self, kind: &str) -> Result<Vec<Managed>>;

    /// Store a new object. Fails if the key is taken.
    fn create(&self, obj: Managed) -> Result<Managed>;

    /// Overwrite the whole object. On success `obj` carries the metadata the
    /// store assigned (generation, resource version).
    ///
    /// An object that is being deleted and has no finalizers left is removed.
    fn update(&self, obj: &mut Managed) -> Result<()>;

    /// Overwrite only the status of the stored object.
    fn update_status(&self, obj: &mut Managed) -> Result<()>;

    /// Request deletion. Objects holding finalizers get a deletion timestamp
    /// and stay until the finalizers are released.
    fn delete(&self, key: &ResourceKey) -> Result<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
