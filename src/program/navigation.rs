//! Page stack and route changes.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::debug;

use crate::error::Result;

use super::Program;
use super::invoke::{field_array, params};
use super::page::{Page, PageInfo};

// ============================================================================
// Constants
// ============================================================================

/// Settle delay after a route change before reading the current page.
pub const ROUTE_SETTLE: Duration = Duration::from_secs(3);

// ============================================================================
// Program - Pages
// ============================================================================

impl Program {
    /// Returns the page stack, bottom first.
    pub async fn page_stack(&self) -> Result<Vec<Page>> {
        let response = self.inner.app.get_page_stack().await?;
        field_array(response, "pageStack")?
            .into_iter()
            .map(|info| self.page(info))
            .collect()
    }

    /// Returns the top page.
    pub async fn current_page(&self) -> Result<Page> {
        let response = self.inner.app.get_current_page().await?;
        self.page(response)
    }

    fn page(&self, info: Value) -> Result<Page> {
        let info: PageInfo = serde_json::from_value(info)?;
        Ok(Page::create(&self.inner.invoker, info, &self.inner.pages))
    }
}

// ============================================================================
// Program - Navigation
// ============================================================================

impl Program {
    /// `uni.navigateTo`, then returns the new current page.
    pub async fn navigate_to(&self, url: &str) -> Result<Page> {
        self.change_route("navigateTo", Some(url)).await
    }

    /// `uni.redirectTo`, then returns the new current page.
    pub async fn redirect_to(&self, url: &str) -> Result<Page> {
        self.change_route("redirectTo", Some(url)).await
    }

    /// `uni.reLaunch`, then returns the new current page.
    pub async fn re_launch(&self, url: &str) -> Result<Page> {
        self.change_route("reLaunch", Some(url)).await
    }

    /// `uni.switchTab`, then returns the new current page.
    pub async fn switch_tab(&self, url: &str) -> Result<Page> {
        self.change_route("switchTab", Some(url)).await
    }

    /// `uni.navigateBack`, then returns the new current page.
    pub async fn navigate_back(&self) -> Result<Page> {
        self.change_route("navigateBack", None).await
    }

    async fn change_route(&self, method: &str, url: Option<&str>) -> Result<Page> {
        debug!(method, url, "Changing route");
        let args = params([("url", json!(url))]);
        self.inner
            .app
            .call_uni_method(json!({ "method": method, "args": [args] }))
            .await?;
        sleep(ROUTE_SETTLE).await;
        self.current_page().await
    }
}
