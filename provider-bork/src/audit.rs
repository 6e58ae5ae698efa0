//! Audit logging for provider events.
//!
//! Events are always logged via tracing under the `audit` target and kept in
//! a bounded in-memory history that operators and tests can inspect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::apis::{BorkResource, ResourceKey};

const DEFAULT_HISTORY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Audit,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub object_ids: Vec<String>,
}

/// Provider audit logger
pub struct AuditLogger {
    component: String,
    capacity: usize,
    history: Mutex<VecDeque<AuditEvent>>,
}

impl AuditLogger {
    pub fn new(component: &str) -> Self {
        Self::with_capacity(component, DEFAULT_HISTORY)
    }

    pub fn with_capacity(component: &str, capacity: usize) -> Self {
        Self {
            component: component.to_string(),
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
        }
    }

    /// Logs via tracing only, keeps no history.
    pub fn new_noop() -> Self {
        Self::with_capacity("", 0)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, object_ids: Vec<String>) {
        let message = message.into();

        match level {
            LogLevel::Error => {
                tracing::error!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Audit | LogLevel::Info => {
                tracing::info!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
        }

        if self.capacity == 0 {
            return;
        }
        // A poisoned history only loses diagnostics
        if let Ok(mut history) = self.history.lock() {
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(AuditEvent {
                timestamp: Utc::now(),
                level,
                message,
                object_ids,
            });
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained events that mention `key`.
    pub fn events_for(&self, key: &ResourceKey) -> Vec<AuditEvent> {
        let id = key.to_string();
        self.events()
            .into_iter()
            .filter(|e| e.object_ids.contains(&id))
            .collect()
    }

    // External resource events
    pub fn creating(&self, cr: &BorkResource) {
        let key = cr.metadata.key();
        self.log(
            LogLevel::Audit,
            format!(
                "Creating: {} (authoritative={}, contended={})",
                key, cr.spec.for_provider.authoritative_value, cr.spec.for_provider.contended_value
            ),
            vec![key.to_string()],
        );
    }

    pub fn deleting(&self, cr: &BorkResource) {
        let key = cr.metadata.key();
        self.log(
            LogLevel::Audit,
            format!(
                "Deleting: {} (authoritative={}, contended={})",
                key, cr.spec.for_provider.authoritative_value, cr.spec.for_provider.contended_value
            ),
            vec![key.to_string()],
        );
    }

    pub fn converged(&self, key: &ResourceKey, from: i64, to: i64) {
        self.log(
            LogLevel::Audit,
            format!("Converged: {} contended value {} -> {}", key, from, to),
            vec![key.to_string()],
        );
    }

    // Reconcile events
    pub fn connect_failed(&self, key: &ResourceKey, error: &str) {
        self.log(
            LogLevel::Warn,
            format!("Cannot connect to external system for {}: {}", key, error),
            vec![key.to_string()],
        );
    }

    pub fn reconcile_failed(&self, key: &ResourceKey, error: &str) {
        self.log(
            LogLevel::Error,
            format!("Reconcile failed for {}: {}", key, error),
            vec![key.to_string()],
        );
    }

    pub fn finalized(&self, key: &ResourceKey) {
        self.log(
            LogLevel::Info,
            format!("Released finalizer on {}", key),
            vec![key.to_string()],
        );
    }
}

/// Create a shared audit logger
pub fn create_audit_logger(component: &str) -> Arc<AuditLogger> {
    Arc::new(AuditLogger::new(component))
}
