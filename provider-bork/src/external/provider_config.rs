//! Provider configuration and credential lookup.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::apis::{ProviderConfig, ProviderConfigKind, ProviderConfigReference, ResourceKey, Secret};
use crate::store::Result;

/// Source of provider configs and the secrets they point at.
#[async_trait]
pub trait ProviderConfigSource: Send + Sync {
    /// Record that `resource` uses the referenced config.
    async fn track_usage(
        &self,
        resource: &ResourceKey,
        reference: &ProviderConfigReference,
    ) -> Result<()>;

    async fn get_provider_config(
        &self,
        kind: ProviderConfigKind,
        key: &ResourceKey,
    ) -> Result<Option<ProviderConfig>>;

    async fn get_secret(&self, key: &ResourceKey) -> Result<Option<Secret>>;
}

/// In-memory provider configs, secrets and usage records.
#[derive(Default)]
pub struct MemoryProviderConfigs {
    configs: RwLock<HashMap<(ProviderConfigKind, ResourceKey), ProviderConfig>>,
    secrets: RwLock<HashMap<ResourceKey, Secret>>,
    /// Users per config, keyed like `configs`.
    usages: RwLock<HashMap<(ProviderConfigKind, ResourceKey), BTreeSet<ResourceKey>>>,
}

impl MemoryProviderConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_config(&self, config: ProviderConfig) {
        let key = (config.kind, config.key());
        self.configs.write().await.insert(key, config);
    }

    pub async fn add_secret(&self, secret: Secret) {
        self.secrets.write().await.insert(secret.key(), secret);
    }

    /// Resources recorded as users of the config at `key`.
    pub async fn users(&self, kind: ProviderConfigKind, key: &ResourceKey) -> Vec<ResourceKey> {
        self.usages
            .read()
            .await
            .get(&(kind, key.clone()))
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProviderConfigSource for MemoryProviderConfigs {
    async fn track_usage(
        &self,
        resource: &ResourceKey,
        reference: &ProviderConfigReference,
    ) -> Result<()> {
        self.usages
            .write()
            .await
            .entry((reference.kind, reference.resolve(resource)))
            .or_default()
            .insert(resource.clone());
        Ok(())
    }

    async fn get_provider_config(
        &self,
        kind: ProviderConfigKind,
        key: &ResourceKey,
    ) -> Result<Option<ProviderConfig>> {
        Ok(self.configs.read().await.get(&(kind, key.clone())).cloned())
    }

    async fn get_secret(&self, key: &ResourceKey) -> Result<Option<Secret>> {
        Ok(self.secrets.read().await.get(key).cloned())
    }
}
