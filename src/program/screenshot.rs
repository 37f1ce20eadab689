//! Screenshot capture.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

use super::Program;
use super::invoke::field;

// ============================================================================
// ScreenshotBuilder
// ============================================================================

/// Configures and captures an application screenshot.
///
/// ```ignore
/// let png = program.screenshot().full_page().capture_bytes().await?;
/// program.screenshot().save("home.png").await?;
/// ```
pub struct ScreenshotBuilder<'a> {
    program: &'a Program,
    full_page: bool,
}

impl<'a> ScreenshotBuilder<'a> {
    pub(crate) fn new(program: &'a Program) -> Self {
        Self {
            program,
            full_page: false,
        }
    }

    /// Captures the whole page instead of the viewport.
    #[must_use]
    pub fn full_page(mut self) -> Self {
        self.full_page = true;
        self
    }

    /// Captures and returns base64 data.
    pub async fn capture(&self) -> Result<String> {
        debug!(full_page = self.full_page, "Capturing screenshot");
        let response = self
            .program
            .inner
            .app
            .capture_screenshot(json!({ "fullPage": self.full_page }))
            .await?;

        match field(response, "data") {
            serde_json::Value::String(data) => Ok(data),
            other => Err(Error::protocol(format!(
                "Screenshot response missing data, got {other}"
            ))),
        }
    }

    /// Captures and returns raw image bytes.
    pub async fn capture_bytes(&self) -> Result<Vec<u8>> {
        let data = self.capture().await?;
        Ok(Base64Standard.decode(data)?)
    }

    /// Captures and writes the image to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.capture_bytes().await?;
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(())
    }
}

// ============================================================================
// Program - Screenshot
// ============================================================================

impl Program {
    /// Starts a screenshot.
    #[must_use]
    pub fn screenshot(&self) -> ScreenshotBuilder<'_> {
        ScreenshotBuilder::new(self)
    }
}
