//! State Store
//!
//! In-memory snapshot of every resource instance's attributes as last
//! reported by the provider, keyed by [`ResourceAddress`]. Only apply,
//! import and destroy change it; predicates and checks only read.

use crate::error::{Error, Result};
use crate::gcp::json::scalar_to_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Whether an address names a managed resource or a read-only data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

/// `type.name` or `data.type.name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddress {
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn managed(resource_type: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }

    pub fn data(resource_type: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.mode == ResourceMode::Data
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_data() {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid resource address {s:?}"));
        let parts: Vec<&str> = s.split('.').collect();
        let address = match parts.as_slice() {
            ["data", resource_type, name] => Self::data(resource_type, name),
            [resource_type, name] => Self::managed(resource_type, name),
            _ => return Err(invalid()),
        };
        if address.resource_type.is_empty() || address.name.is_empty() {
            return Err(invalid());
        }
        Ok(address)
    }
}

impl Serialize for ResourceAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Attributes of one resource instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceInstance {
    pub attributes: Map<String, Value>,
}

impl ResourceInstance {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Build from a JSON object; anything else is a shape error
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(attributes) => Ok(Self { attributes }),
            other => Err(Error::shape("resource instance", "object", &other)),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.string_attribute("id")
    }

    /// Attribute by dotted path (`cdn_policy.0.signed_url_cache_max_age_sec`);
    /// numeric segments index into arrays
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.attributes.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current).filter(|v| !v.is_null())
    }

    /// Scalar attribute rendered as a string; empty strings count as unset
    pub fn string_attribute(&self, key: &str) -> Option<String> {
        self.attribute(key)
            .and_then(scalar_to_string)
            .filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_string(), value);
    }
}

/// Every tracked instance, ordered by address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    resources: BTreeMap<ResourceAddress, ResourceInstance>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: ResourceAddress, instance: ResourceInstance) {
        self.resources.insert(address, instance);
    }

    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceInstance> {
        self.resources.remove(address)
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceInstance> {
        self.resources.get(address)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceAddress, &ResourceInstance)> {
        self.resources.iter()
    }

    /// Managed instances only; data sources are never created or destroyed
    pub fn managed(&self) -> impl Iterator<Item = (&ResourceAddress, &ResourceInstance)> {
        self.resources.iter().filter(|(address, _)| !address.is_data())
    }

    /// Managed instances of one resource type
    pub fn instances_of<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a ResourceAddress, &'a ResourceInstance)> + 'a {
        self.managed()
            .filter(move |(address, _)| address.resource_type == resource_type)
    }

    /// Distinct managed resource types, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .managed()
            .map(|(address, _)| address.resource_type.as_str())
            .collect();
        types.dedup();
        types
    }

    /// Resolve `type.name.attr` or `data.type.name.attr`
    pub fn lookup(&self, reference: &str) -> Option<&Value> {
        let (address, rest) = if let Some(rest) = reference.strip_prefix("data.") {
            let mut parts = rest.splitn(3, '.');
            let address = ResourceAddress::data(parts.next()?, parts.next()?);
            (address, parts.next()?)
        } else {
            let mut parts = reference.splitn(3, '.');
            let address = ResourceAddress::managed(parts.next()?, parts.next()?);
            (address, parts.next()?)
        };
        self.get(&address)?.attribute(rest)
    }
}

impl FromIterator<(ResourceAddress, ResourceInstance)> for State {
    fn from_iter<I: IntoIterator<Item = (ResourceAddress, ResourceInstance)>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(value: Value) -> ResourceInstance {
        ResourceInstance::from_value(value).unwrap()
    }

    #[test]
    fn test_address_round_trip() {
        let managed: ResourceAddress = "google_storage_bucket.bucket".parse().unwrap();
        assert_eq!(managed, ResourceAddress::managed("google_storage_bucket", "bucket"));
        assert_eq!(managed.to_string(), "google_storage_bucket.bucket");

        let data: ResourceAddress = "data.google_project.project".parse().unwrap();
        assert!(data.is_data());
        assert_eq!(data.to_string(), "data.google_project.project");

        assert!("nope".parse::<ResourceAddress>().is_err());
        assert!("a..b".parse::<ResourceAddress>().is_err());
    }

    #[test]
    fn test_nested_attribute() {
        let i = instance(json!({
            "id": "projects/p/global/backendBuckets/b",
            "cdn_policy": [{"signed_url_cache_max_age_sec": 7200}],
            "empty": ""
        }));
        assert_eq!(i.id().as_deref(), Some("projects/p/global/backendBuckets/b"));
        assert_eq!(
            i.string_attribute("cdn_policy.0.signed_url_cache_max_age_sec").as_deref(),
            Some("7200")
        );
        assert_eq!(i.string_attribute("empty"), None);
        assert_eq!(i.attribute("cdn_policy.1"), None);
    }

    #[test]
    fn test_instances_of_skips_data_sources() {
        let mut state = State::new();
        state.insert(
            ResourceAddress::managed("google_storage_bucket", "a"),
            instance(json!({"name": "a"})),
        );
        state.insert(
            ResourceAddress::data("google_storage_bucket", "existing"),
            instance(json!({"name": "existing"})),
        );
        state.insert(
            ResourceAddress::managed("google_tpu_node", "tpu"),
            instance(json!({"name": "tpu"})),
        );

        let names: Vec<&str> = state
            .instances_of("google_storage_bucket")
            .map(|(a, _)| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(
            state.resource_types(),
            vec!["google_storage_bucket", "google_tpu_node"]
        );
    }

    #[test]
    fn test_cross_reference_lookup() {
        let mut state = State::new();
        state.insert(
            ResourceAddress::managed("google_compute_backend_bucket", "test_backend_bucket"),
            instance(json!({"name": "test-bucket-abc"})),
        );
        state.insert(
            ResourceAddress::data("google_project", "project"),
            instance(json!({"number": 1234})),
        );
        assert_eq!(
            state.lookup("google_compute_backend_bucket.test_backend_bucket.name"),
            Some(&json!("test-bucket-abc"))
        );
        assert_eq!(state.lookup("data.google_project.project.number"), Some(&json!(1234)));
        assert_eq!(state.lookup("google_compute_backend_bucket.missing.name"), None);
    }

    #[test]
    fn test_state_serializes_by_address() {
        let mut state = State::new();
        state.insert(
            ResourceAddress::managed("google_storage_bucket", "a"),
            instance(json!({"name": "a"})),
        );
        let encoded = serde_json::to_value(&state).unwrap();
        assert_eq!(encoded, json!({"google_storage_bucket.a": {"name": "a"}}));
        let decoded: State = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, state);
    }
}
