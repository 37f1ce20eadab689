//! Remote method catalogue.
//!
//! Methods follow `Namespace.methodName` format. Every method carries the
//! connection it prefers: state owned by the running application goes over
//! the runtime connection, everything the IDE/simulator can answer goes over
//! the devtool connection.
//!
//! | Namespace | Runtime | Devtool |
//! |-----------|---------|---------|
//! | `App` | getPageStack, callUniMethod, getCurrentPage, mockUniMethod | callFunction, captureScreenshot, exit, addBinding, enableLog |
//! | `Page` | getData, setData, callMethod | getElement, getElements, getWindowProperties |
//! | `Element` | getData, setData, callMethod | everything else |
//! | `Tool` | | getInfo, enableRemoteDebug, close, getTestAccounts |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// Channel
// ============================================================================

/// Which of the two connections a method prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Connection to the running application.
    Runtime,
    /// Connection to the IDE/simulator.
    Devtool,
}

impl Channel {
    /// Returns the namespace tag used in logs.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::Devtool => "devtool",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Method
// ============================================================================

/// Declares the method enum together with its wire name and channel.
macro_rules! methods {
    ($($variant:ident => ($wire:literal, $channel:ident)),+ $(,)?) => {
        /// Every remote method the program surface invokes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Method {
            $(
                #[doc = concat!("`", $wire, "`")]
                $variant,
            )+
        }

        impl Method {
            /// All methods, in declaration order.
            pub const ALL: &'static [Method] = &[$(Method::$variant),+];

            /// Returns the wire name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Returns the preferred connection.
            #[must_use]
            pub const fn channel(self) -> Channel {
                match self {
                    $(Self::$variant => Channel::$channel,)+
                }
            }
        }

        impl FromStr for Method {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(Error::invalid_argument(format!("unknown method {other}"))),
                }
            }
        }
    };
}

methods! {
    // App
    AppGetPageStack => ("App.getPageStack", Runtime),
    AppCallUniMethod => ("App.callUniMethod", Runtime),
    AppGetCurrentPage => ("App.getCurrentPage", Runtime),
    AppMockUniMethod => ("App.mockUniMethod", Runtime),
    AppCallFunction => ("App.callFunction", Devtool),
    AppCaptureScreenshot => ("App.captureScreenshot", Devtool),
    AppExit => ("App.exit", Devtool),
    AppAddBinding => ("App.addBinding", Devtool),
    AppEnableLog => ("App.enableLog", Devtool),

    // Page
    PageGetData => ("Page.getData", Runtime),
    PageSetData => ("Page.setData", Runtime),
    PageCallMethod => ("Page.callMethod", Runtime),
    PageGetElement => ("Page.getElement", Devtool),
    PageGetElements => ("Page.getElements", Devtool),
    PageGetWindowProperties => ("Page.getWindowProperties", Devtool),

    // Element
    ElementGetData => ("Element.getData", Runtime),
    ElementSetData => ("Element.setData", Runtime),
    ElementCallMethod => ("Element.callMethod", Runtime),
    ElementGetElement => ("Element.getElement", Devtool),
    ElementGetElements => ("Element.getElements", Devtool),
    ElementGetOffset => ("Element.getOffset", Devtool),
    ElementGetHtml => ("Element.getHTML", Devtool),
    ElementGetAttributes => ("Element.getAttributes", Devtool),
    ElementGetStyles => ("Element.getStyles", Devtool),
    ElementGetDomProperties => ("Element.getDOMProperties", Devtool),
    ElementGetProperties => ("Element.getProperties", Devtool),
    ElementTap => ("Element.tap", Devtool),
    ElementLongpress => ("Element.longpress", Devtool),
    ElementTouchstart => ("Element.touchstart", Devtool),
    ElementTouchmove => ("Element.touchmove", Devtool),
    ElementTouchend => ("Element.touchend", Devtool),
    ElementTriggerEvent => ("Element.triggerEvent", Devtool),
    ElementCallFunction => ("Element.callFunction", Devtool),
    ElementCallContextMethod => ("Element.callContextMethod", Devtool),

    // Tool
    ToolGetInfo => ("Tool.getInfo", Devtool),
    ToolEnableRemoteDebug => ("Tool.enableRemoteDebug", Devtool),
    ToolClose => ("Tool.close", Devtool),
    ToolGetTestAccounts => ("Tool.getTestAccounts", Devtool),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_methods() {
        let runtime: Vec<_> = Method::ALL
            .iter()
            .filter(|m| m.channel() == Channel::Runtime)
            .map(|m| m.as_str())
            .collect();

        assert_eq!(
            runtime,
            vec![
                "App.getPageStack",
                "App.callUniMethod",
                "App.getCurrentPage",
                "App.mockUniMethod",
                "Page.getData",
                "Page.setData",
                "Page.callMethod",
                "Element.getData",
                "Element.setData",
                "Element.callMethod",
            ]
        );
    }

    #[test]
    fn test_tool_methods_prefer_devtool() {
        for method in Method::ALL.iter().filter(|m| m.as_str().starts_with("Tool.")) {
            assert_eq!(method.channel(), Channel::Devtool);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            "Element.getHTML".parse::<Method>().unwrap(),
            Method::ElementGetHtml
        );
        assert!("Element.explode".parse::<Method>().is_err());
    }

    #[test]
    fn test_wire_names_are_unique() {
        let mut names: Vec<_> = Method::ALL.iter().map(|m| m.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Method::ALL.len());
    }
}
