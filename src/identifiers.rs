//! Type-safe identifiers for protocol and domain entities.
//!
//! Newtype wrappers prevent mixing request, page and element ids.
//! Page and element ids arrive from the application as either JSON numbers or
//! strings; both normalize to the same textual key so identity lookups do not
//! depend on how the peer chose to encode them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Correlation id of an outgoing request.
///
/// Generated ids are UUID v4 strings. Ids parsed from inbound messages keep
/// whatever text the peer sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Generates a fresh, unique request id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Extracts a request id from an inbound `id` field.
    ///
    /// Returns `None` for absent, null, empty-string and zero ids, which the
    /// protocol treats as "no id" (broadcast event).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(Arc::from(s.as_str()))),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(Self(Arc::from(n.to_string()))),
            _ => None,
        }
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Entity ids
// ============================================================================

/// Defines a page/element id newtype that accepts numbers or strings.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            key: String,
            raw: Value,
        }

        // Identity is the normalized key; `3` and `"3"` name the same entity.
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.key.hash(state);
            }
        }

        impl $name {
            /// Builds an id from the JSON value the application sent.
            #[must_use]
            pub fn from_value(value: Value) -> Self {
                let key = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Self { key, raw: value }
            }

            /// Returns the normalized textual key.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.key
            }

            /// Returns the id exactly as the application encoded it.
            #[inline]
            #[must_use]
            pub fn raw(&self) -> &Value {
                &self.raw
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.key)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self::from_value(Value::from(id))
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::from_value(Value::from(id))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.raw.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Value::deserialize(deserializer).map(Self::from_value)
            }
        }
    };
}

entity_id!(
    /// Identifier of a page in the application's page stack.
    PageId
);

entity_id!(
    /// Identifier of an element inside a page.
    ElementId
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: FxHashSet<RequestId> = (0..1000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_request_id_from_value() {
        assert_eq!(
            RequestId::from_value(&json!("abc")).map(|id| id.to_string()),
            Some("abc".to_string())
        );
        assert_eq!(
            RequestId::from_value(&json!(7)).map(|id| id.to_string()),
            Some("7".to_string())
        );
        assert!(RequestId::from_value(&json!("")).is_none());
        assert!(RequestId::from_value(&json!(0)).is_none());
        assert!(RequestId::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_request_id_serializes_as_string() {
        let id = RequestId::from("42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
    }

    #[test]
    fn test_entity_id_keeps_raw_encoding() {
        let numeric = PageId::from_value(json!(3));
        let text = PageId::from_value(json!("3"));

        assert_eq!(numeric, text);
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!(3));
        assert_eq!(serde_json::to_value(&text).unwrap(), json!("3"));
    }

    #[test]
    fn test_entity_id_deserialize() {
        let id: ElementId = serde_json::from_value(json!("el-1")).unwrap();
        assert_eq!(id, ElementId::from("el-1"));
    }
}
