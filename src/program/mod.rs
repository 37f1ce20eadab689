//! Automation API over a launched application.
//!
//! A [`Program`] wraps a connected [`Puppet`](crate::puppet::Puppet) and
//! exposes pages, elements and application-wide calls. Pages and elements
//! are identity-mapped: the same remote id always yields the same handle.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Program struct, events, bindings, lifecycle |
//! | `navigation` | Page stack and route changes |
//! | `script` | Uni API calls, mocking, evaluation |
//! | `screenshot` | Screenshot capture |
//! | `page` | Page handle |
//! | `element` | Element handle and variants |
//! | `app`, `tool` | Raw `App.*` / `Tool.*` methods |

// ============================================================================
// Submodules
// ============================================================================

mod app;
mod core;
mod invoke;
mod navigation;
mod screenshot;
mod script;
mod tool;

pub mod element;
pub mod page;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Binding, CONSOLE, EXCEPTION, Program, ProgramOptions};
pub use app::App;
pub use element::{Element, ElementKind, Offset, Size};
pub use navigation::ROUTE_SETTLE;
pub use page::{Page, WaitCondition};
pub use screenshot::ScreenshotBuilder;
pub use script::MockResult;
pub use tool::Tool;
