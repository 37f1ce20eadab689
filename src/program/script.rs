//! Uni API calls, mocking and function evaluation.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;

use super::Program;
use super::invoke::field;

// ============================================================================
// MockResult
// ============================================================================

/// What a mocked uni method does.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResult {
    /// Always returns this value.
    Value(Value),
    /// Runs this function declaration (JavaScript source) with the mock's
    /// args followed by the call's args.
    Function(String),
}

impl MockResult {
    /// Mocks with a function declaration.
    #[inline]
    #[must_use]
    pub fn function(declaration: impl Into<String>) -> Self {
        Self::Function(declaration.into())
    }
}

/// A string whose trimmed text starts with `function` or `() =>` is a
/// function declaration; anything else is a fixed value.
impl From<Value> for MockResult {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) if is_function_source(&text) => Self::Function(text),
            other => Self::Value(other),
        }
    }
}

fn is_function_source(text: &str) -> bool {
    let text = text.trim();
    text.starts_with("function") || text.starts_with("() =>")
}

// ============================================================================
// Program - Uni API
// ============================================================================

impl Program {
    /// Calls `uni.<method>(...args)` and returns its result.
    pub async fn call_uni_method(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let response = self
            .inner
            .app
            .call_uni_method(json!({ "method": method, "args": args }))
            .await?;
        Ok(field(response, "result"))
    }

    /// Returns `uni.getSystemInfoSync()`.
    pub async fn system_info(&self) -> Result<Value> {
        self.call_uni_method("getSystemInfoSync", vec![]).await
    }

    /// Scrolls the page to `scroll_top` without animation.
    pub async fn page_scroll_to(&self, scroll_top: f64) -> Result<()> {
        self.call_uni_method(
            "pageScrollTo",
            vec![json!({ "scrollTop": scroll_top, "duration": 0 })],
        )
        .await?;
        Ok(())
    }

    /// Replaces `uni.<method>` in the application.
    ///
    /// `args` are only sent for [`MockResult::Function`].
    pub async fn mock_uni_method(
        &self,
        method: &str,
        result: impl Into<MockResult>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let params = match result.into() {
            MockResult::Function(declaration) => json!({
                "method": method,
                "functionDeclaration": declaration,
                "args": args,
            }),
            MockResult::Value(value) => json!({ "method": method, "result": value }),
        };
        debug!(method, "Mocking uni method");
        self.inner.app.mock_uni_method(params).await
    }

    /// Restores a mocked `uni.<method>`.
    pub async fn restore_uni_method(&self, method: &str) -> Result<Value> {
        self.inner
            .app
            .mock_uni_method(json!({ "method": method }))
            .await
    }

    /// Runs a self-contained function declaration in the application and
    /// returns its result.
    ///
    /// ```ignore
    /// let title = program
    ///     .evaluate("function (key) { return getApp().globalData[key] }", vec![json!("title")])
    ///     .await?;
    /// ```
    pub async fn evaluate(&self, function_declaration: &str, args: Vec<Value>) -> Result<Value> {
        let response = self
            .inner
            .app
            .call_function(json!({
                "functionDeclaration": function_declaration,
                "args": args,
            }))
            .await?;
        Ok(field(response, "result"))
    }

    /// Returns the devtool's test accounts.
    pub async fn test_accounts(&self) -> Result<Value> {
        let response = self.inner.tool.get_test_accounts().await?;
        Ok(field(response, "accounts"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_result_conversions() {
        assert_eq!(MockResult::from(json!(1)), MockResult::Value(json!(1)));
        assert_eq!(
            MockResult::from(json!("function () { return 1 }")),
            MockResult::Function("function () { return 1 }".into())
        );
        assert_eq!(
            MockResult::from(json!("  () => 1")),
            MockResult::Function("  () => 1".into())
        );
        assert_eq!(
            MockResult::from(json!("(a) => a")),
            MockResult::Value(json!("(a) => a"))
        );
        assert_eq!(MockResult::from(json!("ok")), MockResult::Value(json!("ok")));
        assert_eq!(
            MockResult::function("function () {}"),
            MockResult::Function("function () {}".into())
        );
    }
}
