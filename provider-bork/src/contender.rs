//! An independent writer that keeps pulling `contendedValue` away from the
//! authoritative value, so the control loop always has drift to correct.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::apis::BORK_RESOURCE_KIND;
use crate::store::{ResourceStore, StoreError};

pub struct Contender {
    store: Arc<dyn ResourceStore>,
    value: i64,
    interval: Duration,
}

impl Contender {
    pub fn new(store: Arc<dyn ResourceStore>, value: i64, interval: Duration) -> Self {
        Self {
            store,
            value,
            interval,
        }
    }

    /// Write the contender's value into every resource that does not hold it
    /// already. Returns the number of writes.
    pub fn contend_once(&self) -> Result<usize, StoreError> {
        let mut writes = 0;
        for mut obj in self.store.list(BORK_RESOURCE_KIND)? {
            if obj.meta().is_being_deleted() {
                continue;
            }
            let Some(cr) = obj.as_bork_mut() else {
                continue;
            };
            if cr.spec.for_provider.contended_value == self.value {
                continue;
            }
            cr.spec.for_provider.contended_value = self.value;

            match self.store.update(&mut obj) {
                Ok(()) => writes += 1,
                // Removed between list and write
                Err(StoreError::NotFound(key)) => debug!(resource = %key, "Resource vanished"),
                Err(e) => return Err(e),
            }
        }
        Ok(writes)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(value = self.value, interval = ?self.interval, "Contender started");
        let this = Arc::new(self);
        let mut ticker = interval(this.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let contender = this.clone();
                    match tokio::task::spawn_blocking(move || contender.contend_once()).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(writes)) => debug!(writes, "Contended values overwritten"),
                        Ok(Err(e)) => warn!(error = %e, "Contender write failed"),
                        Err(e) => warn!(error = %e, "Contender task failed"),
                    }
                }
            }
        }
        info!("Contender stopped");
    }
}
