//! ProviderConfig and ClusterProviderConfig: where a resource's credentials
//! come from.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::meta::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderConfigKind {
    /// Namespaced config, resolved in the managed resource's namespace.
    ProviderConfig,
    ClusterProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigReference {
    #[serde(default = "default_kind")]
    pub kind: ProviderConfigKind,
    pub name: String,
}

fn default_kind() -> ProviderConfigKind {
    ProviderConfigKind::ClusterProviderConfig
}

impl ProviderConfigReference {
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            kind: ProviderConfigKind::ClusterProviderConfig,
            name: name.into(),
        }
    }

    pub fn namespaced(name: impl Into<String>) -> Self {
        Self {
            kind: ProviderConfigKind::ProviderConfig,
            name: name.into(),
        }
    }

    /// Key of the referenced config as seen from the resource at `owner`.
    pub fn resolve(&self, owner: &ResourceKey) -> ResourceKey {
        match self.kind {
            ProviderConfigKind::ProviderConfig => ResourceKey {
                namespace: owner.namespace.clone(),
                name: self.name.clone(),
            },
            ProviderConfigKind::ClusterProviderConfig => ResourceKey::cluster(&self.name),
        }
    }
}

/// Where credentials are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "PascalCase")]
pub enum CredentialsSource {
    None,
    #[serde(rename_all = "camelCase")]
    Secret {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        name: String,
        key: String,
    },
    Environment {
        name: String,
    },
    Filesystem {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderConfigKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub credentials: CredentialsSource,
}

impl ProviderConfig {
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// A named bag of secret data, keyed like any other object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub data: std::collections::BTreeMap<String, String>,
}

impl Secret {
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}
