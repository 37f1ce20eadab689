//! `App.*` remote methods.

use serde_json::{Value, json};

use crate::error::Result;
use crate::events::ListenerId;
use crate::protocol::Method;
use crate::protocol::event::{BINDING_CALLED, EXCEPTION_THROWN, LOG_ADDED};

use super::invoke::Invoker;

// ============================================================================
// App
// ============================================================================

/// Application-level remote API.
///
/// Thin, untyped layer: params go out as given, results come back raw.
/// [`Program`](super::Program) builds the typed surface on top.
#[derive(Debug, Clone)]
pub struct App {
    invoker: Invoker,
}

impl App {
    pub(crate) fn new(invoker: Invoker) -> Self {
        Self { invoker }
    }

    /// `App.getPageStack` → `{pageStack: [{id, path, query}]}`.
    pub async fn get_page_stack(&self) -> Result<Value> {
        self.invoker.invoke(Method::AppGetPageStack, json!({})).await
    }

    /// `App.callUniMethod` with `{method, args}`.
    pub async fn call_uni_method(&self, params: Value) -> Result<Value> {
        self.invoker.invoke(Method::AppCallUniMethod, params).await
    }

    /// `App.getCurrentPage` → `{id, path, query}`.
    pub async fn get_current_page(&self) -> Result<Value> {
        self.invoker.invoke(Method::AppGetCurrentPage, json!({})).await
    }

    /// `App.mockUniMethod`.
    pub async fn mock_uni_method(&self, params: Value) -> Result<Value> {
        self.invoker.invoke(Method::AppMockUniMethod, params).await
    }

    /// `App.callFunction` with `{functionDeclaration, args}`.
    pub async fn call_function(&self, params: Value) -> Result<Value> {
        self.invoker.invoke(Method::AppCallFunction, params).await
    }

    /// `App.captureScreenshot` → `{data}` (base64).
    pub async fn capture_screenshot(&self, params: Value) -> Result<Value> {
        self.invoker.invoke(Method::AppCaptureScreenshot, params).await
    }

    /// `App.exit`.
    pub async fn exit(&self) -> Result<Value> {
        self.invoker.invoke(Method::AppExit, json!({})).await
    }

    /// `App.addBinding` with `{name}`.
    pub async fn add_binding(&self, params: Value) -> Result<Value> {
        self.invoker.invoke(Method::AppAddBinding, params).await
    }

    /// `App.enableLog`.
    pub async fn enable_log(&self) -> Result<Value> {
        self.invoker.invoke(Method::AppEnableLog, json!({})).await
    }

    /// Subscribes to `App.logAdded`.
    pub fn on_log_added<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.invoker.puppet().events().on(LOG_ADDED, listener)
    }

    /// Subscribes to `App.bindingCalled`.
    pub fn on_binding_called<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.invoker.puppet().events().on(BINDING_CALLED, listener)
    }

    /// Subscribes to `App.exceptionThrown`.
    pub fn on_exception_thrown<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.invoker.puppet().events().on(EXCEPTION_THROWN, listener)
    }
}
