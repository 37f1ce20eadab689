//! Wire message types.
//!
//! Both connections speak the same JSON protocol, one document per
//! WebSocket text frame.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Peer | `{id, method, params}` |
//! | `Response` | Peer → Client | `{id, result}` or `{id, error: {message}}` |
//! | `Event` | Peer → Client | `{method, params}` without id |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Event type and well-known event names |
//! | `method` | Method catalogue with preferred connection |
//! | `request` | Request, Response and inbound parsing |

// ============================================================================
// Submodules
// ============================================================================

/// Event message types.
pub mod event;

/// Remote method catalogue.
pub mod method;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{BindingCall, Event};
pub use method::{Channel, Method};
pub use request::{Incoming, RemoteError, Request, Response};
