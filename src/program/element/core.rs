//! Element handle and the methods every variant shares.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ElementId, PageId};
use crate::protocol::Method;
use crate::program::invoke::{Invoker, field, field_array};

use super::kind::{ElementKind, normalize_tag_name};

// ============================================================================
// Constants
// ============================================================================

/// Hold time of a synthesized long press.
const LONGPRESS_HOLD: Duration = Duration::from_millis(350);

/// Property holding the component's public props on checked platforms.
const PUBLIC_PROPS: &str = "__propPublic";

// ============================================================================
// Types
// ============================================================================

/// Element identity map of one page.
pub(crate) type ElementMap = Arc<Mutex<FxHashMap<ElementId, Element>>>;

/// Element description as the application reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ElementInfo {
    pub element_id: ElementId,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub node_id: Value,
    #[serde(default)]
    pub video_id: Value,
    #[serde(default)]
    pub nvue: bool,
}

/// Rendered size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Position relative to the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub left: f64,
    pub top: f64,
}

/// Shared element state.
struct ElementInner {
    id: ElementId,
    page_id: PageId,
    node_id: Option<Value>,
    video_id: Option<Value>,
    tag_name: String,
    nvue: bool,
    kind: ElementKind,
    invoker: Invoker,
    /// The owning page's map; weak because the map holds this element.
    elements: Weak<Mutex<FxHashMap<ElementId, Element>>>,
    /// Cached public props, fetched on first checked `property` call.
    public_props: Mutex<Option<Value>>,
}

// ============================================================================
// Element
// ============================================================================

/// A handle to an element of a page.
///
/// Handles come from the page's identity map: selecting the same element
/// twice yields clones of one handle.
#[derive(Clone)]
pub struct Element {
    inner: Arc<ElementInner>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.inner.id)
            .field("tag_name", &self.inner.tag_name)
            .field("page_id", &self.inner.page_id)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Element {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl Element {
    /// Returns the map entry for `info`, creating it on first sight.
    pub(crate) fn create(
        invoker: &Invoker,
        info: ElementInfo,
        page_id: &PageId,
        elements: &ElementMap,
    ) -> Self {
        let mut map = elements.lock();
        if let Some(existing) = map.get(&info.element_id) {
            return existing.clone();
        }

        let node_id = truthy(info.node_id);
        let kind = ElementKind::resolve(&info.tag_name, node_id.is_some());
        let element = Self {
            inner: Arc::new(ElementInner {
                id: info.element_id.clone(),
                page_id: page_id.clone(),
                node_id,
                video_id: truthy(info.video_id),
                tag_name: normalize_tag_name(&info.tag_name),
                nvue: info.nvue,
                kind,
                invoker: invoker.clone(),
                elements: Arc::downgrade(elements),
                public_props: Mutex::new(None),
            }),
        };

        trace!(element_id = %element.inner.id, kind = %kind, "Element created");
        map.insert(info.element_id, element.clone());
        element
    }

    /// Returns `true` if both handles are the same map entry.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Element - Accessors
// ============================================================================

impl Element {
    /// Returns the element id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ElementId {
        &self.inner.id
    }

    /// Returns the owning page id.
    #[inline]
    #[must_use]
    pub fn page_id(&self) -> &PageId {
        &self.inner.page_id
    }

    /// Returns the tag name (`body`/`page-body` read as `page`).
    #[inline]
    #[must_use]
    pub fn tag_name(&self) -> &str {
        &self.inner.tag_name
    }

    /// Returns the variant.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.inner.kind
    }

    /// Returns the component node id, for custom components.
    #[inline]
    #[must_use]
    pub fn node_id(&self) -> Option<&Value> {
        self.inner.node_id.as_ref()
    }

    /// Returns the video context id.
    #[inline]
    #[must_use]
    pub fn video_id(&self) -> Option<&Value> {
        self.inner.video_id.as_ref()
    }

    /// Returns `true` for native-rendered (nvue) elements.
    #[inline]
    #[must_use]
    pub fn is_nvue(&self) -> bool {
        self.inner.nvue
    }

    /// Returns `{id, tagName, pageId, nodeId, videoId}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.inner.id,
            "tagName": self.inner.tag_name,
            "pageId": self.inner.page_id,
            "nodeId": self.inner.node_id,
            "videoId": self.inner.video_id,
        })
    }
}

// ============================================================================
// Element - Query
// ============================================================================

impl Element {
    /// Finds the first descendant matching `selector`.
    ///
    /// A remote lookup failure reads as "not found"; connection errors
    /// still propagate.
    pub async fn select(&self, selector: &str) -> Result<Option<Element>> {
        let result = self
            .invoke(Method::ElementGetElement, json!({ "selector": selector }))
            .await;
        match result {
            Ok(info) => Ok(Some(self.child(info)?)),
            Err(Error::Remote { message }) => {
                debug!(selector, %message, "Element lookup failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Finds every descendant matching `selector`.
    pub async fn select_all(&self, selector: &str) -> Result<Vec<Element>> {
        let response = self
            .invoke(Method::ElementGetElements, json!({ "selector": selector }))
            .await?;
        field_array(response, "elements")?
            .into_iter()
            .map(|info| self.child(info))
            .collect()
    }

    fn child(&self, info: Value) -> Result<Element> {
        let info: ElementInfo = serde_json::from_value(info)?;
        // A dropped page leaves nothing to share identity with.
        let elements = self.inner.elements.upgrade().unwrap_or_default();
        Ok(Element::create(
            &self.inner.invoker,
            info,
            &self.inner.page_id,
            &elements,
        ))
    }
}

// ============================================================================
// Element - Properties
// ============================================================================

impl Element {
    /// Returns `offsetWidth`/`offsetHeight`.
    pub async fn size(&self) -> Result<Size> {
        let values = self.dom_properties(&["offsetWidth", "offsetHeight"]).await?;
        Ok(Size {
            width: number_at(&values, 0),
            height: number_at(&values, 1),
        })
    }

    /// Returns the page offset.
    pub async fn offset(&self) -> Result<Offset> {
        let response = self.invoke(Method::ElementGetOffset, json!({})).await?;
        Ok(Offset {
            left: field(response.clone(), "left").as_f64().unwrap_or_default(),
            top: field(response, "top").as_f64().unwrap_or_default(),
        })
    }

    /// Returns `innerText`.
    pub async fn text(&self) -> Result<Value> {
        self.dom_property("innerText").await
    }

    /// Returns one attribute.
    pub async fn attribute(&self, name: &str) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetAttributes, json!({ "names": [name] }))
            .await?;
        Ok(first(field(response, "attributes")))
    }

    /// Returns the `value` property.
    pub async fn value(&self) -> Result<Value> {
        self.property("value").await
    }

    /// Returns one component property.
    ///
    /// `scroll-view` reads `scrollTop`/`scrollLeft` and `movable-view` reads
    /// `x`/`y` through their own accessors.
    ///
    /// # Errors
    ///
    /// [`Error::PropertyNotExists`] on platforms that check property names
    /// when `name` is not a public prop.
    pub async fn property(&self, name: &str) -> Result<Value> {
        match (self.inner.kind, name) {
            (ElementKind::ScrollView, "scrollTop") => {
                return self.call_function("scroll-view.scrollTop", vec![]).await;
            }
            (ElementKind::ScrollView, "scrollLeft") => {
                return self.call_function("scroll-view.scrollLeft", vec![]).await;
            }
            (ElementKind::MovableView, "x") => return self.raw_property("_translateX").await,
            (ElementKind::MovableView, "y") => return self.raw_property("_translateY").await,
            _ => {}
        }

        if self.inner.invoker.puppet().check_property() {
            self.ensure_public_prop(name).await?;
        }
        self.raw_property(name).await
    }

    /// Returns inner HTML.
    pub async fn html(&self) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetHtml, json!({ "type": "inner" }))
            .await?;
        Ok(field(response, "html"))
    }

    /// Returns outer HTML.
    pub async fn outer_html(&self) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetHtml, json!({ "type": "outer" }))
            .await?;
        Ok(field(response, "html"))
    }

    /// Returns one computed style.
    pub async fn style(&self, name: &str) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetStyles, json!({ "names": [name] }))
            .await?;
        Ok(first(field(response, "styles")))
    }

    /// Returns one DOM property.
    pub async fn dom_property(&self, name: &str) -> Result<Value> {
        Ok(first(Value::Array(self.dom_properties(&[name]).await?)))
    }

    /// Returns several DOM properties, in order.
    pub async fn dom_properties(&self, names: &[&str]) -> Result<Vec<Value>> {
        let response = self
            .invoke(Method::ElementGetDomProperties, json!({ "names": names }))
            .await?;
        field_array(response, "properties")
    }

    /// Reads a property without name checks or variant overrides.
    pub(crate) async fn raw_property(&self, name: &str) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetProperties, json!({ "names": [name] }))
            .await?;
        Ok(first(field(response, "properties")))
    }

    async fn ensure_public_prop(&self, name: &str) -> Result<()> {
        let cached = self.inner.public_props.lock().clone();
        let props = match cached {
            Some(props) => props,
            None => {
                let props = self.raw_property(PUBLIC_PROPS).await?;
                *self.inner.public_props.lock() = Some(props.clone());
                props
            }
        };

        if props.get(name).is_some_and(is_truthy) {
            Ok(())
        } else {
            Err(Error::PropertyNotExists {
                tag_name: self.inner.tag_name.clone(),
                name: name.to_string(),
            })
        }
    }
}

// ============================================================================
// Element - Interaction
// ============================================================================

impl Element {
    /// Taps the element. `switch` toggles through its own function.
    pub async fn tap(&self) -> Result<Value> {
        if self.inner.kind == ElementKind::Switch {
            return self.call_function("switch.tap", vec![]).await;
        }
        self.invoke(Method::ElementTap, json!({})).await
    }

    /// Long-presses the element.
    ///
    /// nvue elements use the remote long press; others get touchstart,
    /// a 350 ms hold, then touchend.
    pub async fn longpress(&self) -> Result<Value> {
        if self.inner.nvue {
            return self.invoke(Method::ElementLongpress, json!({})).await;
        }
        self.touchstart(json!({})).await?;
        tokio::time::sleep(LONGPRESS_HOLD).await;
        self.touchend(json!({})).await
    }

    /// Dispatches a custom event, with optional `detail`.
    pub async fn trigger(&self, event_type: &str, detail: Option<Value>) -> Result<Value> {
        let mut event = Map::new();
        event.insert("type".into(), Value::from(event_type));
        if let Some(detail) = detail {
            event.insert("detail".into(), detail);
        }
        self.invoke(Method::ElementTriggerEvent, Value::Object(event))
            .await
    }

    /// Sends `touchstart` with `options` (touches, changedTouches).
    pub async fn touchstart(&self, options: Value) -> Result<Value> {
        self.invoke(Method::ElementTouchstart, options).await
    }

    /// Sends `touchmove`.
    pub async fn touchmove(&self, options: Value) -> Result<Value> {
        self.invoke(Method::ElementTouchmove, options).await
    }

    /// Sends `touchend`.
    pub async fn touchend(&self, options: Value) -> Result<Value> {
        self.invoke(Method::ElementTouchend, options).await
    }

    /// Calls a named element function in the application and returns its
    /// `result`.
    pub async fn call_function(&self, function_name: &str, args: Vec<Value>) -> Result<Value> {
        let response = self
            .invoke(
                Method::ElementCallFunction,
                json!({ "functionName": function_name, "args": args }),
            )
            .await?;
        Ok(field(response, "result"))
    }
}

// ============================================================================
// Element - Internal
// ============================================================================

impl Element {
    /// Invokes `method` with the element's identifying params merged in.
    pub(crate) async fn invoke(&self, method: Method, params: Value) -> Result<Value> {
        self.inner.invoker.invoke(method, self.with_ids(params)).await
    }

    fn with_ids(&self, params: Value) -> Value {
        let mut map = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert("elementId".into(), self.inner.id.raw().clone());
        map.insert("pageId".into(), self.inner.page_id.raw().clone());
        if let Some(node_id) = &self.inner.node_id {
            map.insert("nodeId".into(), node_id.clone());
        }
        if let Some(video_id) = &self.inner.video_id {
            map.insert("videoId".into(), video_id.clone());
        }
        Value::Object(map)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy(value: Value) -> Option<Value> {
    is_truthy(&value).then_some(value)
}

fn first(value: Value) -> Value {
    match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        _ => Value::Null,
    }
}

fn number_at(values: &[Value], index: usize) -> f64 {
    values
        .get(index)
        .and_then(Value::as_f64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("n1")));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_first() {
        assert_eq!(first(json!([1, 2])), json!(1));
        assert_eq!(first(json!([])), Value::Null);
        assert_eq!(first(json!("x")), Value::Null);
    }

    #[test]
    fn test_element_info_defaults() {
        let info: ElementInfo = serde_json::from_value(json!({"elementId": 4})).unwrap();
        assert_eq!(info.element_id, ElementId::from(4));
        assert_eq!(info.tag_name, "");
        assert!(!info.nvue);
        assert_eq!(truthy(info.node_id), None);
    }
}
