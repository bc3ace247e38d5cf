//! Representation of the entity producing telemetry.
//!
//! A [Resource] is an immutable set of identity attributes (at minimum a
//! service name) attached to every span emitted by a tracer provider. It is
//! built once at startup and never mutated afterwards.

use crate::common::{Key, KeyValue, Value};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute key under which the service name is recorded.
pub const SERVICE_NAME: Key = Key::from_static_str("service.name");

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
}

/// An immutable description of the entity producing telemetry.
///
/// `Arc`-shared so that attaching the resource to every span is a pointer
/// copy.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Resource {
    /// Creates a [ResourceBuilder] with no attributes set.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            attrs: HashMap::new(),
        }
    }

    /// Creates a resource with no attributes.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
            }),
        }
    }

    /// Returns the value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.inner.attrs.get(key)
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns `true` if the resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Iterate over the resource's attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.inner.attrs.iter()
    }
}

impl Default for Resource {
    fn default() -> Self {
        Resource::empty()
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.inner.attrs.len()))?;
        for (k, v) in self.inner.attrs.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Builder for [Resource].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attrs: HashMap<Key, Value>,
}

impl ResourceBuilder {
    /// Record the service name.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue {
            key: SERVICE_NAME,
            value: name.into(),
        })
    }

    /// Add a single attribute. Later values win on duplicate keys.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.insert(kv.key, kv.value);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        for kv in kvs {
            self.attrs.insert(kv.key, kv.value);
        }
        self
    }

    /// Build the immutable [Resource].
    pub fn build(self) -> Resource {
        Resource {
            inner: Arc::new(ResourceInner { attrs: self.attrs }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_service_name() {
        let resource = Resource::builder()
            .with_service_name("otelpoc")
            .with_attribute(KeyValue::new("deployment.environment", "dev"))
            .build();

        assert_eq!(resource.get(&SERVICE_NAME), Some(&Value::from("otelpoc")));
        assert_eq!(resource.len(), 2);
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let resource = Resource::builder()
            .with_attributes(vec![
                KeyValue::new("service.name", "a"),
                KeyValue::new("service.name", "b"),
            ])
            .build();

        assert_eq!(resource.get(&SERVICE_NAME), Some(&Value::from("b")));
    }

    #[test]
    fn clone_is_shared() {
        let resource = Resource::builder().with_service_name("otelpoc").build();
        let cloned = resource.clone();
        assert_eq!(resource, cloned);
        assert!(Arc::ptr_eq(&resource.inner, &cloned.inner));
    }
}
