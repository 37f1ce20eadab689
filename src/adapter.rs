//! Per-target method rewriting.
//!
//! A target may not implement a method under its abstract name. The adapter
//! table lets it redirect the method to another remote name, reshape the
//! params, or satisfy the call entirely on the client.
//!
//! # Example
//!
//! ```ignore
//! use uni_automator::adapter::{Adapter, AdapterEntry};
//! use serde_json::json;
//!
//! let adapter = Adapter::default()
//!     // Rename on the wire.
//!     .with("Element.tap", AdapterEntry::reflect("Element.customTap"))
//!     // Answer locally.
//!     .with(
//!         "Tool.getTestAccounts",
//!         AdapterEntry::intercept(|_send, _params| async { Ok(json!({"accounts": []})) }),
//!     );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::transport::Connection;

// ============================================================================
// Types
// ============================================================================

/// Full interception callback.
pub type InterceptFn =
    Arc<dyn Fn(ReflectSender, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Params transform applied before forwarding.
pub type ParamsFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Where an adapted method goes.
#[derive(Clone)]
pub enum Reflect {
    /// Forward under a different method name.
    Method(String),
    /// Handle the call with a client-side function.
    Intercept(InterceptFn),
}

impl fmt::Debug for Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(name) => f.debug_tuple("Method").field(name).finish(),
            Self::Intercept(_) => f.write_str("Intercept(..)"),
        }
    }
}

// ============================================================================
// ReflectSender
// ============================================================================

/// Send primitive bound to the connection the call arrived on.
///
/// Handed to intercept functions so they can issue their own requests.
#[derive(Debug, Clone)]
pub struct ReflectSender {
    connection: Connection,
}

impl ReflectSender {
    /// Sends `method` on the bound connection (adapter rules still apply).
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.connection.send(method, params).await
    }

    /// Sends `method` without consulting the adapter.
    pub async fn send_direct(&self, method: &str, params: Value) -> Result<Value> {
        self.connection.send_direct(method, params).await
    }
}

// ============================================================================
// AdapterEntry
// ============================================================================

/// One row of the adapter table.
#[derive(Clone, Default)]
pub struct AdapterEntry {
    reflect: Option<Reflect>,
    params: Option<ParamsFn>,
}

impl fmt::Debug for AdapterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterEntry")
            .field("reflect", &self.reflect)
            .field("params", &self.params.is_some())
            .finish()
    }
}

impl AdapterEntry {
    /// Redirects the method to `method`.
    #[must_use]
    pub fn reflect(method: impl Into<String>) -> Self {
        Self {
            reflect: Some(Reflect::Method(method.into())),
            params: None,
        }
    }

    /// Handles the method with `f` instead of a remote call.
    #[must_use]
    pub fn intercept<F, Fut>(f: F) -> Self
    where
        F: Fn(ReflectSender, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            reflect: Some(Reflect::Intercept(Arc::new(move |send, params| {
                f(send, params).boxed()
            }))),
            params: None,
        }
    }

    /// Adds a params transform.
    #[must_use]
    pub fn with_params<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.params = Some(Arc::new(f));
        self
    }

    /// Returns the reflect target, if any.
    #[inline]
    #[must_use]
    pub fn reflect_target(&self) -> Option<&Reflect> {
        self.reflect.as_ref()
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Method-name → [`AdapterEntry`] table. Immutable once built into a puppet.
#[derive(Debug, Clone, Default)]
pub struct Adapter {
    entries: FxHashMap<String, AdapterEntry>,
}

impl Adapter {
    /// Creates an adapter from `(method, entry)` pairs.
    #[must_use]
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, AdapterEntry)>,
        K: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Adds or replaces one entry.
    #[must_use]
    pub fn with(mut self, method: impl Into<String>, entry: AdapterEntry) -> Self {
        self.entries.insert(method.into(), entry);
        self
    }

    /// Returns `true` if the table declares `method`.
    #[inline]
    #[must_use]
    pub fn has(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    /// Returns the number of declared methods.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no method is declared.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatches `method` through its table entry.
    ///
    /// # Errors
    ///
    /// - [`Error::AdapterNotFound`] if the method is not in the table
    /// - [`Error::ReflectRequired`] if the entry has no reflect target
    /// - whatever the forwarded call or intercept function returns
    pub fn send(
        &self,
        connection: Connection,
        method: &str,
        params: Value,
    ) -> BoxFuture<'static, Result<Value>> {
        let Some(entry) = self.entries.get(method) else {
            return futures_util::future::ready(Err(Error::adapter_not_found(method))).boxed();
        };
        let Some(reflect) = entry.reflect.clone() else {
            return futures_util::future::ready(Err(Error::reflect_required(method))).boxed();
        };

        let params = match &entry.params {
            Some(transform) => transform(params),
            None => params,
        };

        match reflect {
            Reflect::Intercept(f) => {
                trace!(method, "Adapter intercept");
                f(ReflectSender { connection }, params)
            }
            Reflect::Method(target) => {
                trace!(method, target = %target, "Adapter reflect");
                async move { connection.send(&target, params).await }.boxed()
            }
        }
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
    fn test_has() {
        let adapter = Adapter::default().with("Element.tap", AdapterEntry::reflect("X"));
        assert!(adapter.has("Element.tap"));
        assert!(!adapter.has("Element.longpress"));
        assert_eq!(adapter.len(), 1);
    }

    #[test]
    fn test_entry_without_reflect_is_still_declared() {
        let adapter = Adapter::new([("Page.getData", AdapterEntry::default())]);
        assert!(adapter.has("Page.getData"));
        assert!(adapter.entries["Page.getData"].reflect_target().is_none());
    }

    #[test]
    fn test_params_transform_is_stored() {
        let entry = AdapterEntry::reflect("Element.customTap").with_params(|mut p| {
            p["extra"] = json!(true);
            p
        });
        let transform = entry.params.clone().unwrap();
        assert_eq!(transform(json!({})), json!({"extra": true}));
        assert!(matches!(
            entry.reflect_target(),
            Some(Reflect::Method(m)) if m == "Element.customTap"
        ));
    }
}
