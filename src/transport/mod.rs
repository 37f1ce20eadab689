//! WebSocket transport layer.
//!
//! A launch holds two independent connections that speak the same JSON
//! protocol:
//!
//! ```text
//! ┌──────────────────┐        runtime (server role)       ┌──────────────┐
//! │                  │◄───────────────────────────────────│ Application  │
//! │  Puppet (Rust)   │         0.0.0.0:PORT               └──────────────┘
//! │                  │
//! │  RuntimeServer   │        devtool (client role)       ┌──────────────┐
//! │  → Connection    │───────────────────────────────────►│ IDE / Sim    │
//! └──────────────────┘         ws://host:port             └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | Duplex WebSocket pump |
//! | `connection` | Request correlation and event routing |
//! | `server` | Runtime listening server |

// ============================================================================
// Submodules
// ============================================================================

/// Request correlation over a socket.
pub mod connection;

/// Runtime listening server.
pub mod server;

/// Duplex WebSocket pump.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, PendingResponse};
pub use server::RuntimeServer;
pub use socket::{Transport, TransportEvent};
