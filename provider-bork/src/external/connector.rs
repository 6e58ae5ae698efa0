//! Connectors produce a [`BorkExternal`] for each reconcile.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::error::{ConfigError, ConnectError, CredentialsError};
use super::provider_config::ProviderConfigSource;
use super::service::ServiceFactory;
use super::{BorkExternal, Connector, ExternalClient};
use crate::apis::{BORK_RESOURCE_KIND, CredentialsSource, Managed, ProviderConfigKind, ResourceKey};
use crate::audit::AuditLogger;
use crate::store::ResourceStore;

/// Connects every resource to the no-op external system without looking at
/// provider configuration.
pub struct NoOpConnector {
    store: Arc<dyn ResourceStore>,
    new_service: Arc<dyn ServiceFactory>,
    audit: Arc<AuditLogger>,
}

impl NoOpConnector {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        new_service: Arc<dyn ServiceFactory>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            new_service,
            audit,
        }
    }
}

#[async_trait]
impl Connector for NoOpConnector {
    async fn connect(&self, mg: &Managed) -> Result<Box<dyn ExternalClient>, ConnectError> {
        if mg.as_bork().is_none() {
            return Err(ConnectError::TypeMismatch {
                expected: BORK_RESOURCE_KIND,
                actual: mg.kind().to_string(),
            });
        }
        let service = self
            .new_service
            .new_service(&[])
            .map_err(ConnectError::ClientConstruction)?;
        debug!(resource = %mg.key(), "Connected to no-op service");

        Ok(Box::new(BorkExternal::new(
            self.store.clone(),
            service,
            self.audit.clone(),
        )))
    }
}

/// Connects a resource by:
/// 1. Tracking that the resource uses its provider config.
/// 2. Getting the ProviderConfig or ClusterProviderConfig.
/// 3. Getting the credentials the config points at.
/// 4. Building the service from those credentials.
pub struct ProviderConfigConnector {
    store: Arc<dyn ResourceStore>,
    configs: Arc<dyn ProviderConfigSource>,
    new_service: Arc<dyn ServiceFactory>,
    audit: Arc<AuditLogger>,
}

impl ProviderConfigConnector {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        configs: Arc<dyn ProviderConfigSource>,
        new_service: Arc<dyn ServiceFactory>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            configs,
            new_service,
            audit,
        }
    }

    async fn credentials(&self, source: &CredentialsSource) -> Result<Vec<u8>, CredentialsError> {
        match source {
            CredentialsSource::None => Ok(Vec::new()),
            CredentialsSource::Secret {
                namespace,
                name,
                key,
            } => {
                let secret_key = ResourceKey {
                    namespace: namespace.clone(),
                    name: name.clone(),
                };
                let secret = self
                    .configs
                    .get_secret(&secret_key)
                    .await?
                    .ok_or_else(|| CredentialsError::SecretNotFound(secret_key.clone()))?;
                secret
                    .data
                    .get(key)
                    .map(|v| v.clone().into_bytes())
                    .ok_or(CredentialsError::MissingKey {
                        secret: secret_key,
                        key: key.clone(),
                    })
            }
            CredentialsSource::Environment { name } => std::env::var(name)
                .map(String::into_bytes)
                .map_err(|source| CredentialsError::Environment {
                    name: name.clone(),
                    source,
                }),
            CredentialsSource::Filesystem { path } => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| CredentialsError::Filesystem {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

#[async_trait]
impl Connector for ProviderConfigConnector {
    async fn connect(&self, mg: &Managed) -> Result<Box<dyn ExternalClient>, ConnectError> {
        let cr = mg.as_bork().ok_or_else(|| ConnectError::TypeMismatch {
            expected: BORK_RESOURCE_KIND,
            actual: mg.kind().to_string(),
        })?;
        let key = cr.metadata.key();

        let reference =
            cr.spec
                .provider_config_ref
                .as_ref()
                .ok_or_else(|| ConnectError::GetConfig {
                    kind: ProviderConfigKind::ClusterProviderConfig,
                    source: ConfigError::MissingReference,
                })?;

        self.configs
            .track_usage(&key, reference)
            .await
            .map_err(ConnectError::TrackUsage)?;

        let config_key = reference.resolve(&key);
        let config = self
            .configs
            .get_provider_config(reference.kind, &config_key)
            .await
            .map_err(|e| ConnectError::GetConfig {
                kind: reference.kind,
                source: ConfigError::Store(e),
            })?
            .ok_or_else(|| ConnectError::GetConfig {
                kind: reference.kind,
                source: ConfigError::NotFound(config_key.clone()),
            })?;

        let credentials = self
            .credentials(&config.credentials)
            .await
            .map_err(ConnectError::GetCredentials)?;

        let service = self
            .new_service
            .new_service(&credentials)
            .map_err(ConnectError::ClientConstruction)?;
        debug!(resource = %key, config = %config_key, "Connected with provider config");

        Ok(Box::new(BorkExternal::new(
            self.store.clone(),
            service,
            self.audit.clone(),
        )))
    }
}
