//! Events emitted by store changes.

use crate::apis::ResourceKey;

/// Events emitted when stored objects change.
///
/// Dispatched via a broadcast channel to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A new object was stored.
    Created { key: ResourceKey, kind: String },
    /// An object was overwritten.
    Updated {
        key: ResourceKey,
        kind: String,
        /// The write changed the object's desired state.
        spec_changed: bool,
        /// The write changed annotations, such as the pause marker.
        annotations_changed: bool,
        /// The object now carries a deletion timestamp.
        deleting: bool,
    },
    /// Only the status was written.
    StatusUpdated { key: ResourceKey, kind: String },
    /// An object was removed for good.
    Deleted { key: ResourceKey, kind: String },
}

impl StoreEvent {
    pub fn key(&self) -> &ResourceKey {
        match self {
            StoreEvent::Created { key, .. }
            | StoreEvent::Updated { key, .. }
            | StoreEvent::StatusUpdated { key, .. }
            | StoreEvent::Deleted { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            StoreEvent::Created { kind, .. }
            | StoreEvent::Updated { kind, .. }
            | StoreEvent::StatusUpdated { kind, .. }
            | StoreEvent::Deleted { kind, .. } => kind,
        }
    }

    /// Whether the change touches desired state and should trigger a
    /// reconcile. Status-only writes never do.
    pub fn changes_desired_state(&self) -> bool {
        match self {
            StoreEvent::Created { .. } => true,
            StoreEvent::Updated {
                spec_changed,
                annotations_changed,
                deleting,
                ..
            } => *spec_changed || *annotations_changed || *deleting,
            StoreEvent::StatusUpdated { .. } | StoreEvent::Deleted { .. } => false,
        }
    }
}
