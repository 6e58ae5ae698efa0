//! BorkResource managed resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use super::condition::Conditions;
use super::meta::{ObjectMeta, ResourceKey};
use super::provider_config::ProviderConfigReference;

pub const BORK_RESOURCE_KIND: &str = "BorkResource";

/// Opaque key/value pairs handed back by the external client.
pub type ConnectionDetails = BTreeMap<String, String>;

/// True when the contended value already matches the authoritative one.
pub fn up_to_date(authoritative: i64, contended: i64) -> bool {
    authoritative == contended
}

/// Provider-facing parameters of a BorkResource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorkParameters {
    /// Source of truth owned by this provider.
    pub authoritative_value: i64,
    /// Field other actors may also write.
    pub contended_value: i64,
}

impl BorkParameters {
    pub fn is_up_to_date(&self) -> bool {
        up_to_date(self.authoritative_value, self.contended_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorkResourceSpec {
    pub for_provider: BorkParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<ProviderConfigReference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorkResourceStatus {
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorkResource {
    pub metadata: ObjectMeta,
    pub spec: BorkResourceSpec,
    #[serde(default)]
    pub status: BorkResourceStatus,
}

impl BorkResource {
    pub fn new(key: &ResourceKey, authoritative_value: i64, contended_value: i64) -> Self {
        Self {
            metadata: ObjectMeta::new(key),
            spec: BorkResourceSpec {
                for_provider: BorkParameters {
                    authoritative_value,
                    contended_value,
                },
                provider_config_ref: None,
            },
            status: BorkResourceStatus::default(),
        }
    }

    pub fn with_provider_config(mut self, reference: ProviderConfigReference) -> Self {
        self.spec.provider_config_ref = Some(reference);
        self
    }
}

/// A resource of any kind this provider does not manage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstructuredResource {
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// Every object the backing store can hold.
///
/// Serialized with a `kind` discriminator next to `metadata`; any kind other
/// than BorkResource round-trips as [`UnstructuredResource`].
#[derive(Debug, Clone)]
pub enum Managed {
    Bork(BorkResource),
    Unstructured(UnstructuredResource),
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    kind: &'a str,
    #[serde(flatten)]
    inner: &'a T,
}

impl Serialize for Managed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Managed::Bork(cr) => Tagged {
                kind: BORK_RESOURCE_KIND,
                inner: cr,
            }
            .serialize(serializer),
            Managed::Unstructured(u) => u.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Managed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| de::Error::missing_field("kind"))?;

        if kind == BORK_RESOURCE_KIND {
            serde_json::from_value(value)
                .map(Managed::Bork)
                .map_err(de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Managed::Unstructured)
                .map_err(de::Error::custom)
        }
    }
}

impl Managed {
    pub fn kind(&self) -> &str {
        match self {
            Managed::Bork(_) => BORK_RESOURCE_KIND,
            Managed::Unstructured(u) => &u.kind,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Managed::Bork(cr) => &cr.metadata,
            Managed::Unstructured(u) => &u.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Managed::Bork(cr) => &mut cr.metadata,
            Managed::Unstructured(u) => &mut u.metadata,
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.meta().key()
    }

    pub fn as_bork(&self) -> Option<&BorkResource> {
        match self {
            Managed::Bork(cr) => Some(cr),
            Managed::Unstructured(_) => None,
        }
    }

    pub fn as_bork_mut(&mut self) -> Option<&mut BorkResource> {
        match self {
            Managed::Bork(cr) => Some(cr),
            Managed::Unstructured(_) => None,
        }
    }

    /// Whether two objects differ in their desired state.
    pub fn spec_differs(&self, other: &Managed) -> bool {
        match (self, other) {
            (Managed::Bork(a), Managed::Bork(b)) => a.spec != b.spec,
            (Managed::Unstructured(a), Managed::Unstructured(b)) => {
                a.kind != b.kind || a.spec != b.spec
            }
            _ => true,
        }
    }
}

impl From<BorkResource> for Managed {
    fn from(cr: BorkResource) -> Self {
        Managed::Bork(cr)
    }
}

impl From<UnstructuredResource> for Managed {
    fn from(u: UnstructuredResource) -> Self {
        Managed::Unstructured(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_to_date_is_equality() {
        for (a, b) in [(0, 0), (2, 1), (5, 5), (-3, 3), (i64::MAX, i64::MAX), (i64::MIN, 0)] {
            assert_eq!(up_to_date(a, b), a == b, "a={a} b={b}");
        }
    }

    #[test]
    fn test_deserialize_bork_resource() {
        let json = r#"{
            "kind": "BorkResource",
            "metadata": { "name": "sample" },
            "spec": { "forProvider": { "authoritativeValue": 2, "contendedValue": 1 } }
        }"#;
        let managed: Managed = serde_json::from_str(json).unwrap();
        let cr = managed.as_bork().unwrap();
        assert_eq!(cr.metadata.name, "sample");
        assert_eq!(cr.spec.for_provider.authoritative_value, 2);
        assert!(!cr.spec.for_provider.is_up_to_date());
    }

    #[test]
    fn test_deserialize_other_kind_is_unstructured() {
        let json = r#"{
            "kind": "Widget",
            "metadata": { "name": "w" },
            "spec": { "size": 3 }
        }"#;
        let managed: Managed = serde_json::from_str(json).unwrap();
        assert_eq!(managed.kind(), "Widget");
        assert!(managed.as_bork().is_none());
    }

    #[test]
    fn test_serialized_bork_resource_carries_kind() {
        let managed = Managed::Bork(BorkResource::new(&ResourceKey::cluster("a"), 1, 2));
        let value = serde_json::to_value(&managed).unwrap();
        assert_eq!(value["kind"], "BorkResource");
        assert_eq!(value["spec"]["forProvider"]["contendedValue"], 2);
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let json = r#"{ "metadata": { "name": "a" } }"#;
        assert!(serde_json::from_str::<Managed>(json).is_err());
    }

    #[test]
    fn test_spec_differs_ignores_status() {
        let key = ResourceKey::cluster("a");
        let a = Managed::Bork(BorkResource::new(&key, 1, 1));
        let mut b = a.clone();
        if let Managed::Bork(cr) = &mut b {
            cr.status
                .connection_details
                .insert("k".to_string(), "v".to_string());
        }
        assert!(!a.spec_differs(&b));

        if let Managed::Bork(cr) = &mut b {
            cr.spec.for_provider.contended_value = 7;
        }
        assert!(a.spec_differs(&b));
    }
}
