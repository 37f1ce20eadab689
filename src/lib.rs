//! uni-automator - Remote test-automation driver for uni applications.
//!
//! This library launches a uni application (building it when needed),
//! connects to it and to the platform's developer tool, and exposes pages
//! and elements for end-to-end tests.
//!
//! # Architecture
//!
//! Two JSON-over-WebSocket channels carry every call:
//!
//! - **Runtime (server role)**: the running application dials back into a
//!   listener on the automation port (default 9520)
//! - **Devtool (client role)**: the library dials the developer tool
//!
//! Key design principles:
//!
//! - Requests are matched to responses strictly by id, never by order
//! - Each remote method has a preferred channel; without a devtool
//!   connection everything goes over the runtime
//! - Platform differences live in a [`Target`] and its [`Adapter`] table
//! - Pages and elements are identity-mapped per program
//!
//! # Quick Start
//!
//! ```no_run
//! use uni_automator::{DevtoolsDescriptor, LaunchOptions, Launcher, Result, TargetDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let launcher = Launcher::new()
//!         .target("h5", TargetDescriptor::new(DevtoolsDescriptor::new("browser")));
//!
//!     let program = launcher
//!         .launch(LaunchOptions::new("h5").with_project_path("/path/to/project"))
//!         .await?;
//!
//!     let page = program.navigate_to("/pages/index/index").await?;
//!     if let Some(button) = page.select(".submit").await? {
//!         button.tap().await?;
//!     }
//!
//!     program.teardown().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`launcher`] | Validation, compile decision, connection setup |
//! | [`program`] | [`Program`], [`Page`], [`Element`] |
//! | [`puppet`] | Per-launch state: connections, server, build process |
//! | [`target`] | Platform hooks |
//! | [`adapter`] | Per-platform method rewriting |
//! | [`compiler`] | Build process driver |
//! | [`config`] | Launch options and environment snapshot |
//! | [`descriptor`] | Persisted `.automator.json` build descriptor |
//! | [`transport`] | Connections and the runtime listener |
//! | [`protocol`] | Wire messages and the method catalogue |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Per-platform method rewriting.
pub mod adapter;

/// Build process driver.
pub mod compiler;

/// Launch options, devtool options and the environment snapshot.
pub mod config;

/// Persisted build descriptor.
pub mod descriptor;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Named event bus.
pub mod events;

/// Request, page and element ids.
pub mod identifiers;

/// Launch orchestration.
pub mod launcher;

/// Program, page and element API.
pub mod program;

/// Wire message types and the remote method catalogue.
pub mod protocol;

/// Per-launch state.
pub mod puppet;

/// Platform targets.
pub mod target;

/// WebSocket connections and the runtime listener.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Program types
pub use program::element::{
    CustomElement, InputElement, MovableViewElement, ScrollViewElement, SliderElement,
    SwiperElement, VideoElement,
};
pub use program::{
    App, Element, ElementKind, MockResult, Offset, Page, Program, ProgramOptions, Size, Tool,
    WaitCondition,
};

// Launch types
pub use adapter::{Adapter, AdapterEntry};
pub use config::{BuildMode, DevtoolsOptions, Environment, LaunchOptions, TeardownMode};
pub use launcher::Launcher;
pub use puppet::Puppet;
pub use target::{DevtoolsDescriptor, Target, TargetDescriptor};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ElementId, PageId, RequestId};

// Transport types
pub use transport::Connection;
