pub mod apis;
pub mod audit;
pub mod config;
pub mod contender;
pub mod controller;
pub mod external;
pub mod managed;
pub mod store;

pub use apis::{BORK_RESOURCE_KIND, BorkResource, Managed, ResourceKey};
pub use audit::{AuditLogger, create_audit_logger};
pub use controller::{Controller, ControllerOptions};
pub use managed::{ManagedReconciler, ReconcileError};
pub use store::{MemoryStore, ResourceStore, StoreError, StoreEvent};
