//! Broadcast event messages.
//!
//! Events are id-less notifications pushed by the application or the devtool
//! (console output, uncaught exceptions, binding calls, remote-debug state).
//! The method name doubles as the event name on the puppet's event bus.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Well-known event names
// ============================================================================

/// Console output from the application (`App.enableLog` must be on).
pub const LOG_ADDED: &str = "App.logAdded";

/// A binding exposed with `App.addBinding` was called remotely.
pub const BINDING_CALLED: &str = "App.bindingCalled";

/// Uncaught exception inside the application.
pub const EXCEPTION_THROWN: &str = "App.exceptionThrown";

/// A physical device attached to the remote debugger.
pub const REMOTE_DEBUG_CONNECTED: &str = "Tool.onRemoteDebugConnected";

/// Preview client attached (same meaning on tools that only support preview).
pub const PREVIEW_CONNECTED: &str = "Tool.onPreviewConnected";

// ============================================================================
// Event
// ============================================================================

/// An event notification from a remote peer.
///
/// # Format
///
/// ```json
/// { "method": "App.logAdded", "params": { ... } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Namespace.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns the namespace part of the method (`App` for `App.logAdded`).
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event part of the method (`logAdded` for `App.logAdded`).
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }
}

// ============================================================================
// BindingCall
// ============================================================================

/// Payload of [`BINDING_CALLED`].
#[derive(Debug, Clone, Deserialize)]
pub struct BindingCall {
    /// Name the binding was exposed under.
    pub name: String,
    /// Arguments passed by the application.
    #[serde(default)]
    pub args: Vec<Value>,
}

// ============================================================================
// Tests
// ============================================================================
