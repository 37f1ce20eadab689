//! Typed views over [`Element`] for variant-specific methods.
//!
//! A view is obtained with one of the `Element::as_*` accessors and derefs
//! to the element, so the shared methods stay reachable.

use std::ops::Deref;

use serde_json::{Value, json};

use crate::error::Result;
use crate::protocol::Method;
use crate::program::invoke::{field, params};

use super::core::Element;
use super::kind::ElementKind;

// ============================================================================
// View Declarations
// ============================================================================

macro_rules! views {
    ($($(#[$doc:meta])* $name:ident => $accessor:ident [$($kind:ident),+];)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone)]
            pub struct $name(Element);

            impl Deref for $name {
                type Target = Element;

                fn deref(&self) -> &Element {
                    &self.0
                }
            }

            impl Element {
                #[doc = concat!("Returns the [`", stringify!($name), "`] view if the variant matches.")]
                #[must_use]
                pub fn $accessor(&self) -> Option<$name> {
                    matches!(self.kind(), $(ElementKind::$kind)|+).then(|| $name(self.clone()))
                }
            }
        )*
    };
}

views! {
    /// Custom component: data and component methods.
    CustomElement => as_custom [Custom];
    /// `input` or `textarea`.
    InputElement => as_input [Input, Textarea];
    /// `scroll-view`.
    ScrollViewElement => as_scroll_view [ScrollView];
    /// `swiper`.
    SwiperElement => as_swiper [Swiper];
    /// `movable-view`.
    MovableViewElement => as_movable_view [MovableView];
    /// `slider`.
    SliderElement => as_slider [Slider];
    /// `video`: context methods.
    VideoElement => as_video [Video];
}

// ============================================================================
// CustomElement
// ============================================================================

impl CustomElement {
    /// Returns component data, or the value at `path`.
    pub async fn data(&self, path: Option<&str>) -> Result<Value> {
        let response = self
            .invoke(Method::ElementGetData, params([("path", json!(path))]))
            .await?;
        Ok(field(response, "data"))
    }

    /// Merges `data` into the component data.
    pub async fn set_data(&self, data: Value) -> Result<Value> {
        self.invoke(Method::ElementSetData, json!({ "data": data }))
            .await
    }

    /// Calls a component method and returns its `result`.
    pub async fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let response = self
            .invoke(
                Method::ElementCallMethod,
                json!({ "method": method, "args": args }),
            )
            .await?;
        Ok(field(response, "result"))
    }
}

// ============================================================================
// InputElement
// ============================================================================

impl InputElement {
    /// Types `value` into the field.
    pub async fn input(&self, value: impl Into<Value>) -> Result<Value> {
        let function = match self.kind() {
            ElementKind::Textarea => "textarea.input",
            _ => "input.input",
        };
        self.call_function(function, vec![value.into()]).await
    }
}

// ============================================================================
// ScrollViewElement
// ============================================================================

impl ScrollViewElement {
    pub async fn scroll_to(&self, x: f64, y: f64) -> Result<Value> {
        self.call_function("scroll-view.scrollTo", vec![json!(x), json!(y)])
            .await
    }

    pub async fn scroll_width(&self) -> Result<Value> {
        self.call_function("scroll-view.scrollWidth", vec![]).await
    }

    pub async fn scroll_height(&self) -> Result<Value> {
        self.call_function("scroll-view.scrollHeight", vec![]).await
    }
}

// ============================================================================
// Remaining Views
// ============================================================================

impl SwiperElement {
    /// Swipes to slide `index`.
    pub async fn swipe_to(&self, index: usize) -> Result<Value> {
        self.call_function("swiper.swipeTo", vec![json!(index)])
            .await
    }
}

impl MovableViewElement {
    /// Moves the view to `(x, y)`.
    pub async fn move_to(&self, x: f64, y: f64) -> Result<Value> {
        self.call_function("movable-view.moveTo", vec![json!(x), json!(y)])
            .await
    }
}

impl SliderElement {
    /// Slides to `value`.
    pub async fn slide_to(&self, value: f64) -> Result<Value> {
        self.call_function("slider.slideTo", vec![json!(value)])
            .await
    }
}

impl VideoElement {
    /// Calls a method on the video context (`play`, `seek`, ...).
    pub async fn call_context_method(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke(
            Method::ElementCallContextMethod,
            json!({ "method": method, "args": args }),
        )
        .await
    }
}
