//! Reconcile errors.

use std::time::Duration;

use thiserror::Error;

use crate::external::{ConnectError, ExternalError};
use crate::store::StoreError;

/// Errors returned by a single reconcile. None of them is fatal; the
/// controller records them and retries with backoff.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cannot get managed resource: {0}")]
    Get(#[source] StoreError),

    #[error("cannot add finalizer: {0}")]
    AddFinalizer(#[source] StoreError),

    #[error("cannot remove finalizer: {0}")]
    RemoveFinalizer(#[source] StoreError),

    #[error("cannot update managed resource status: {0}")]
    UpdateStatus(#[source] StoreError),

    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("cannot observe external resource: {0}")]
    Observe(#[source] ExternalError),

    #[error("cannot create external resource: {0}")]
    Create(#[source] ExternalError),

    #[error("cannot update external resource: {0}")]
    Update(#[source] ExternalError),

    #[error("cannot delete external resource: {0}")]
    Delete(#[source] ExternalError),

    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),

    #[error("reconcile task failed: {0}")]
    Join(String),
}

impl ReconcileError {
    /// Whether retrying the same resource can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Connect(e) => e.is_retryable(),
            ReconcileError::Observe(e)
            | ReconcileError::Create(e)
            | ReconcileError::Update(e)
            | ReconcileError::Delete(e) => e.is_retryable(),
            _ => true,
        }
    }
}
