//! Page handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::PageId;
use crate::protocol::Method;

use super::element::{Element, ElementInfo, ElementMap, Size};
use super::invoke::{Invoker, field, field_array, params};

// ============================================================================
// Constants
// ============================================================================

/// Polling interval of [`Page::wait_until`].
pub const WAIT_INTERVAL: Duration = Duration::from_millis(250);

/// Default deadline of [`Page::wait_until`].
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Page identity map of one program.
pub(crate) type PageMap = Arc<Mutex<FxHashMap<PageId, Page>>>;

/// Page description as the application reports it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PageInfo {
    pub id: PageId,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: Value,
}

/// What [`Page::wait_for`] waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Sleep for a fixed duration.
    Delay(Duration),
    /// Wait until the selector matches at least one element.
    Selector(String),
}

impl From<Duration> for WaitCondition {
    fn from(duration: Duration) -> Self {
        Self::Delay(duration)
    }
}

impl From<&str> for WaitCondition {
    fn from(selector: &str) -> Self {
        Self::Selector(selector.to_string())
    }
}

impl From<String> for WaitCondition {
    fn from(selector: String) -> Self {
        Self::Selector(selector)
    }
}

struct PageInner {
    id: PageId,
    path: String,
    /// Updated when the same page id is reported again.
    query: RwLock<Value>,
    invoker: Invoker,
    elements: ElementMap,
}

// ============================================================================
// Page
// ============================================================================

/// A page of the running application.
///
/// Handles come from the program's identity map; some pages (tab bar pages)
/// keep their id across navigations, in which case the existing handle is
/// reused and only its query is refreshed.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("query", &*self.inner.query.read())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Page {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Page {
    /// Returns the map entry for `info`, creating it on first sight.
    pub(crate) fn create(invoker: &Invoker, info: PageInfo, pages: &PageMap) -> Self {
        let mut map = pages.lock();
        if let Some(existing) = map.get(&info.id) {
            *existing.inner.query.write() = info.query;
            return existing.clone();
        }

        let page = Self {
            inner: Arc::new(PageInner {
                id: info.id.clone(),
                path: info.path,
                query: RwLock::new(info.query),
                invoker: invoker.clone(),
                elements: Arc::new(Mutex::new(FxHashMap::default())),
            }),
        };
        trace!(page_id = %page.inner.id, path = %page.inner.path, "Page created");
        map.insert(info.id, page.clone());
        page
    }

    /// Returns `true` if both handles are the same map entry.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Page) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &PageId {
        &self.inner.id
    }

    /// Returns the route path (e.g. `pages/index/index`).
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Returns the latest reported query.
    #[must_use]
    pub fn query(&self) -> Value {
        self.inner.query.read().clone()
    }

    /// Returns `{id, path, query}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.inner.id,
            "path": self.inner.path,
            "query": self.query(),
        })
    }
}

// ============================================================================
// Page - Query
// ============================================================================

impl Page {
    /// Finds the first element matching `selector`.
    ///
    /// A remote lookup failure reads as "not found"; connection errors
    /// still propagate.
    pub async fn select(&self, selector: &str) -> Result<Option<Element>> {
        let result = self
            .invoke(Method::PageGetElement, json!({ "selector": selector }))
            .await;
        match result {
            Ok(info) => Ok(Some(self.element(info)?)),
            Err(Error::Remote { message }) => {
                debug!(selector, %message, "Page lookup failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Finds every element matching `selector`.
    pub async fn select_all(&self, selector: &str) -> Result<Vec<Element>> {
        let response = self
            .invoke(Method::PageGetElements, json!({ "selector": selector }))
            .await?;
        field_array(response, "elements")?
            .into_iter()
            .map(|info| self.element(info))
            .collect()
    }

    fn element(&self, info: Value) -> Result<Element> {
        let info: ElementInfo = serde_json::from_value(info)?;
        Ok(Element::create(
            &self.inner.invoker,
            info,
            &self.inner.id,
            &self.inner.elements,
        ))
    }
}

// ============================================================================
// Page - Waiting
// ============================================================================

impl Page {
    /// Sleeps, or waits until a selector matches.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if a selector still matches nothing after
    /// [`WAIT_TIMEOUT`].
    pub async fn wait_for(&self, condition: impl Into<WaitCondition>) -> Result<()> {
        match condition.into() {
            WaitCondition::Delay(duration) => {
                sleep(duration).await;
                Ok(())
            }
            WaitCondition::Selector(selector) => {
                let selector = selector.as_str();
                self.wait_until(move || async move {
                    Ok(!self.select_all(selector).await?.is_empty())
                })
                .await
            }
        }
    }

    /// Polls `predicate` every [`WAIT_INTERVAL`] until it returns `true`.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] after [`WAIT_TIMEOUT`]; predicate errors propagate.
    pub async fn wait_until<F, Fut>(&self, predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        wait_until(predicate, WAIT_INTERVAL, WAIT_TIMEOUT).await
    }
}

/// Polls `predicate` until it holds or `timeout` passes.
pub(crate) async fn wait_until<F, Fut>(
    mut predicate: F,
    interval: Duration,
    timeout: Duration,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await? {
            return Ok(());
        }
        if Instant::now() + interval > deadline {
            return Err(Error::timeout(
                "wait_until",
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ));
        }
        sleep(interval).await;
    }
}

// ============================================================================
// Page - Data & Methods
// ============================================================================

impl Page {
    /// Returns page data, or the value at `path`.
    pub async fn data(&self, path: Option<&str>) -> Result<Value> {
        let response = self
            .invoke(Method::PageGetData, params([("path", json!(path))]))
            .await?;
        Ok(field(response, "data"))
    }

    /// Merges `data` into the page data.
    pub async fn set_data(&self, data: Value) -> Result<Value> {
        self.invoke(Method::PageSetData, json!({ "data": data }))
            .await
    }

    /// Calls a page method and returns its `result`.
    pub async fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let response = self
            .invoke(Method::PageCallMethod, json!({ "method": method, "args": args }))
            .await?;
        Ok(field(response, "result"))
    }

    /// Returns the document scroll size.
    pub async fn size(&self) -> Result<Size> {
        let values = self
            .window_properties(&[
                "document.documentElement.scrollWidth",
                "document.documentElement.scrollHeight",
            ])
            .await?;
        let number = |i: usize| values.get(i).and_then(Value::as_f64).unwrap_or_default();
        Ok(Size {
            width: number(0),
            height: number(1),
        })
    }

    /// Returns the document scroll offset.
    pub async fn scroll_top(&self) -> Result<Value> {
        self.window_property("document.documentElement.scrollTop")
            .await
    }

    /// Reads one window property by dotted path.
    pub async fn window_property(&self, name: &str) -> Result<Value> {
        let mut values = self.window_properties(&[name]).await?;
        Ok(if values.is_empty() {
            Value::Null
        } else {
            values.swap_remove(0)
        })
    }

    /// Reads several window properties, in order.
    pub async fn window_properties(&self, names: &[&str]) -> Result<Vec<Value>> {
        let response = self
            .invoke(Method::PageGetWindowProperties, json!({ "names": names }))
            .await?;
        field_array(response, "properties")
    }

    async fn invoke(&self, method: Method, params: Value) -> Result<Value> {
        let mut map = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert("pageId".into(), self.inner.id.raw().clone());
        self.inner
            .invoker
            .invoke(method, Value::Object(map))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
