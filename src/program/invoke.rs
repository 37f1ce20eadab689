//! Channel selection for remote calls.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Channel, Method};
use crate::puppet::Puppet;
use crate::transport::Connection;

// ============================================================================
// Invoker
// ============================================================================

/// Sends catalogue methods over their preferred connection.
///
/// Without a devtool connection every method goes over the runtime
/// connection.
#[derive(Debug, Clone)]
pub(crate) struct Invoker {
    puppet: Puppet,
}

impl Invoker {
    pub(crate) fn new(puppet: Puppet) -> Self {
        Self { puppet }
    }

    #[inline]
    pub(crate) fn puppet(&self) -> &Puppet {
        &self.puppet
    }

    /// Picks the connection `method` goes over.
    pub(crate) fn connection_for(&self, method: Method) -> Result<Connection> {
        let devtool = match method.channel() {
            Channel::Devtool => self.puppet.devtool_connection(),
            Channel::Runtime => None,
        };
        match devtool {
            Some(connection) => Ok(connection),
            None => self.puppet.runtime_connection().ok_or(Error::ConnectionClosed),
        }
    }

    /// Invokes `method` with `params`.
    pub(crate) async fn invoke(&self, method: Method, params: Value) -> Result<Value> {
        let connection = self.connection_for(method)?;
        trace!(method = %method, channel = %connection.namespace(), "Invoking");
        connection.send(method.as_str(), params).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a params object from key/value pairs, skipping nulls.
pub(crate) fn params<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Value::Object(map)
}

/// Reads `key` from a response object, or `null`.
pub(crate) fn field(mut value: Value, key: &str) -> Value {
    value
        .get_mut(key)
        .map(Value::take)
        .unwrap_or(Value::Null)
}

/// Reads `key` as an array from a response object.
pub(crate) fn field_array(value: Value, key: &str) -> Result<Vec<Value>> {
    match field(value, key) {
        Value::Array(items) => Ok(items),
        other => Err(Error::protocol(format!("expected `{key}` array, got {other}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_params_skips_null() {
        let value = params([("path", Value::Null), ("pageId", json!(3))]);
        assert_eq!(value, json!({"pageId": 3}));
    }

    #[test]
    fn test_field_helpers() {
        assert_eq!(field(json!({"data": {"a": 1}}), "data"), json!({"a": 1}));
        assert_eq!(field(json!({}), "data"), Value::Null);
        assert_eq!(
            field_array(json!({"elements": [1, 2]}), "elements").unwrap(),
            vec![json!(1), json!(2)]
        );
        assert!(field_array(json!({"elements": 1}), "elements").is_err());
    }
}
