//! Backing store abstraction for managed resources.
//!
//! ```text
//! engine / reconciler → Arc<dyn ResourceStore>
//!                            ↓
//!                      store.get(&key)          // read current state
//!                      store.update(&mut obj)   // write full state
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use provider_bork::store::{MemoryStore, ResourceStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! store.create(BorkResource::new(&key, 2, 1).into())?;
//! let mut events = store.subscribe();
//! ```

mod error;
mod event;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use event::StoreEvent;
pub use memory::MemoryStore;
pub use traits::ResourceStore;
