//! Errors surfaced by connectors and external clients.

use std::path::PathBuf;

use thiserror::Error;

use crate::apis::{ProviderConfigKind, ResourceKey};
use crate::store::StoreError;

use super::service::ServiceError;

/// Errors returned by external client operations.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// The operation was handed a resource of the wrong kind. This is an
    /// integration defect, retrying will not help.
    #[error("managed resource is not a {expected} custom resource (got {actual})")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    /// Writing the converged resource back to the store failed.
    #[error("cannot update BorkResource: {0}")]
    PersistenceWrite(#[source] StoreError),
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::PersistenceWrite(_))
    }
}

/// Errors returned while connecting to the external system.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("managed resource is not a {expected} custom resource (got {actual})")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("cannot track ProviderConfig usage: {0}")]
    TrackUsage(#[source] StoreError),

    #[error("cannot get {}: {source}", config_kind_name(.kind))]
    GetConfig {
        kind: ProviderConfigKind,
        #[source]
        source: ConfigError,
    },

    #[error("cannot get credentials: {0}")]
    GetCredentials(#[source] CredentialsError),

    #[error("cannot create new Service: {0}")]
    ClientConstruction(#[source] ServiceError),
}

impl ConnectError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::TypeMismatch { .. })
    }
}

fn config_kind_name(kind: &ProviderConfigKind) -> &'static str {
    match kind {
        ProviderConfigKind::ProviderConfig => "ProviderConfig",
        ProviderConfigKind::ClusterProviderConfig => "ClusterProviderConfig",
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no providerConfigRef set")]
    MissingReference,

    #[error("{0} not found")]
    NotFound(ResourceKey),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("secret {0} not found")]
    SecretNotFound(ResourceKey),

    #[error("secret {secret} has no key {key}")]
    MissingKey { secret: ResourceKey, key: String },

    #[error("cannot read environment variable {name}: {source}")]
    Environment {
        name: String,
        #[source]
        source: std::env::VarError,
    },

    #[error("cannot read credentials file {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
