//! `Tool.*` remote methods.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::Result;
use crate::protocol::Method;
use crate::protocol::event::{PREVIEW_CONNECTED, REMOTE_DEBUG_CONNECTED};

use super::invoke::Invoker;

// ============================================================================
// Tool
// ============================================================================

/// Devtool-level remote API.
#[derive(Debug, Clone)]
pub struct Tool {
    invoker: Invoker,
}

impl Tool {
    pub(crate) fn new(invoker: Invoker) -> Self {
        Self { invoker }
    }

    /// `Tool.getInfo`.
    pub async fn get_info(&self) -> Result<Value> {
        self.invoker.invoke(Method::ToolGetInfo, json!({})).await
    }

    /// `Tool.enableRemoteDebug` → `{qrCode}`.
    pub async fn enable_remote_debug(&self, auto: bool) -> Result<Value> {
        self.invoker
            .invoke(Method::ToolEnableRemoteDebug, json!({ "auto": auto }))
            .await
    }

    /// `Tool.close`.
    pub async fn close(&self) -> Result<Value> {
        self.invoker.invoke(Method::ToolClose, json!({})).await
    }

    /// `Tool.getTestAccounts` → `{accounts}`.
    pub async fn get_test_accounts(&self) -> Result<Value> {
        self.invoker.invoke(Method::ToolGetTestAccounts, json!({})).await
    }

    /// Fires `listener` once on the next remote-debug (or preview) connect.
    ///
    /// Some devtools report a preview connect instead of a remote-debug one,
    /// so both events are watched and the listener runs at most once.
    pub fn on_remote_debug_connected<F>(&self, listener: F)
    where
        F: FnOnce(&Value) + Send + 'static,
    {
        let events = self.invoker.puppet().events();
        let slot = Arc::new(Mutex::new(Some(listener)));

        for event in [REMOTE_DEBUG_CONNECTED, PREVIEW_CONNECTED] {
            let slot = Arc::clone(&slot);
            events.once(event, move |params| {
                if let Some(listener) = slot.lock().take() {
                    listener(params);
                }
            });
        }
    }
}
