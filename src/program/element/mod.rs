//! Element handles.
//!
//! Every element is an [`Element`]; its [`ElementKind`] is fixed from the
//! tag name (or component node id) when first seen and decides which typed
//! view ([`CustomElement`], [`InputElement`], ...) is available.

mod core;
mod kind;
mod variants;

pub(crate) use self::core::{ElementInfo, ElementMap};

pub use self::core::{Element, Offset, Size};
pub use kind::{ElementKind, normalize_tag_name};
pub use variants::{
    CustomElement, InputElement, MovableViewElement, ScrollViewElement, SliderElement,
    SwiperElement, VideoElement,
};
