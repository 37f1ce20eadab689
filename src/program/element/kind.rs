//! Element variant registry.

use std::fmt;

// ============================================================================
// ElementKind
// ============================================================================

/// Behavior variant of an element, fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Plain element.
    #[default]
    Base,
    /// Custom component instance (has a component node id).
    Custom,
    /// `input`.
    Input,
    /// `textarea`.
    Textarea,
    /// `scroll-view`.
    ScrollView,
    /// `swiper`.
    Swiper,
    /// `movable-view`.
    MovableView,
    /// `switch`.
    Switch,
    /// `slider`.
    Slider,
    /// `video` (context methods).
    Video,
}

/// Tag name → variant.
const REGISTRY: &[(&str, ElementKind)] = &[
    ("input", ElementKind::Input),
    ("textarea", ElementKind::Textarea),
    ("scroll-view", ElementKind::ScrollView),
    ("swiper", ElementKind::Swiper),
    ("movable-view", ElementKind::MovableView),
    ("switch", ElementKind::Switch),
    ("slider", ElementKind::Slider),
    ("video", ElementKind::Video),
];

impl ElementKind {
    /// Looks up the variant for `tag_name`, defaulting to [`ElementKind::Base`].
    #[must_use]
    pub fn from_tag(tag_name: &str) -> Self {
        REGISTRY
            .iter()
            .find(|(tag, _)| *tag == tag_name)
            .map_or(Self::Base, |(_, kind)| *kind)
    }

    /// Chooses the variant for a new element. A component node id wins over
    /// the tag name.
    #[must_use]
    pub fn resolve(tag_name: &str, has_node_id: bool) -> Self {
        if has_node_id {
            Self::Custom
        } else {
            Self::from_tag(tag_name)
        }
    }

    /// Returns the registry name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "element",
            Self::Custom => "custom",
            Self::Input => "input",
            Self::Textarea => "textarea",
            Self::ScrollView => "scroll-view",
            Self::Swiper => "swiper",
            Self::MovableView => "movable-view",
            Self::Switch => "switch",
            Self::Slider => "slider",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes page root tags to `page`.
#[must_use]
pub fn normalize_tag_name(tag_name: &str) -> String {
    match tag_name {
        "body" | "page-body" => "page".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
