//! Error types for the automator.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use uni_automator::{Program, Result};
//!
//! async fn example(program: &Program) -> Result<()> {
//!     let page = program.current_page().await?;
//!     if let Some(button) = page.select("#submit").await? {
//!         button.tap().await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Orchestration | [`Error::Config`], [`Error::ProjectNotFound`], [`Error::CliPathNotFound`], [`Error::TargetNotProvided`], [`Error::PortInUse`], [`Error::ProcessLaunchFailed`], [`Error::Compile`] |
//! | Connection | [`Error::Connection`], [`Error::RuntimeConnectTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Remote`], [`Error::Protocol`], [`Error::InvalidArgument`] |
//! | Adapter | [`Error::AdapterNotFound`], [`Error::ReflectRequired`] |
//! | Program | [`Error::BindingExists`], [`Error::PropertyNotExists`], [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Base64`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use base64::DecodeError;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Orchestration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when launch options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Project directory does not exist.
    #[error("Project path {} doesn't exist", .path.display())]
    ProjectNotFound {
        /// Resolved project path.
        path: PathBuf,
    },

    /// No build CLI installation could be located.
    #[error("cliPath is not provided")]
    CliPathNotFound,

    /// No target descriptor registered for the platform.
    #[error("puppet is not provided for platform {platform}")]
    TargetNotProvided {
        /// Requested platform id.
        platform: String,
    },

    /// Runtime port (requested or default) is already bound.
    #[error("Port {port} is in use, please specify another port")]
    PortInUse {
        /// Requested port.
        port: u16,
    },

    /// Failed to spawn the build process.
    #[error("Failed to launch build process: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Build process ended without reporting completion.
    #[error("Compile failed: {message}")]
    Compile {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when a WebSocket connection cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The application never connected back to the runtime listener.
    #[error(
        "Failed to connect to runtime, please make sure the project is running (waited {timeout_ms}ms)"
    )]
    RuntimeConnectTimeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// Connection closed before (or while) a request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Error reported by the remote peer, surfaced verbatim.
    #[error("{message}")]
    Remote {
        /// The peer's `error.message`.
        message: String,
    },

    /// Protocol violation or unexpected response shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Adapter Errors
    // ========================================================================
    /// Method is not declared in the adapter table.
    #[error("adapter for {method} not found")]
    AdapterNotFound {
        /// The method that was looked up.
        method: String,
    },

    /// Adapter entry has no reflect target.
    #[error("{method}'s reflect is required")]
    ReflectRequired {
        /// The misconfigured method.
        method: String,
    },

    // ========================================================================
    // Program Errors
    // ========================================================================
    /// A binding with the same name is already exposed.
    #[error("Failed to expose function with name {name}: already exists!")]
    BindingExists {
        /// Binding name.
        name: String,
    },

    /// Component does not publish the requested property.
    #[error("{tag_name}.{name} not exists")]
    PropertyNotExists {
        /// Element tag name.
        tag_name: String,
        /// Requested property.
        name: String,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Base64 decoding error.
    #[error("Base64 error: {0}")]
    Base64(#[from] DecodeError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a project not found error.
    #[inline]
    pub fn project_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ProjectNotFound { path: path.into() }
    }

    /// Creates a target not provided error.
    #[inline]
    pub fn target_not_provided(platform: impl Into<String>) -> Self {
        Self::TargetNotProvided {
            platform: platform.into(),
        }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a compile error.
    #[inline]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a runtime connect timeout error.
    #[inline]
    pub fn runtime_connect_timeout(timeout_ms: u64) -> Self {
        Self::RuntimeConnectTimeout { timeout_ms }
    }

    /// Creates a remote error carrying the peer's message.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an adapter not found error.
    #[inline]
    pub fn adapter_not_found(method: impl Into<String>) -> Self {
        Self::AdapterNotFound {
            method: method.into(),
        }
    }

    /// Creates a reflect required error.
    #[inline]
    pub fn reflect_required(method: impl Into<String>) -> Self {
        Self::ReflectRequired {
            method: method.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RuntimeConnectTimeout { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::RuntimeConnectTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the error came from adapter misconfiguration.
    #[inline]
    #[must_use]
    pub fn is_adapter_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound { .. } | Self::ReflectRequired { .. }
        )
    }

    /// Returns `true` if the error was reported by the remote peer.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_connection_closed_display() {
        assert_eq!(Error::ConnectionClosed.to_string(), "Connection closed");
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = Error::remote("page not found");
        assert_eq!(err.to_string(), "page not found");
        assert!(err.is_remote());
    }

    #[test]
    fn test_adapter_errors() {
        let missing = Error::adapter_not_found("Element.tap");
        let no_reflect = Error::reflect_required("Element.tap");

        assert_eq!(missing.to_string(), "adapter for Element.tap not found");
        assert_eq!(no_reflect.to_string(), "Element.tap's reflect is required");
        assert!(missing.is_adapter_error());
        assert!(no_reflect.is_adapter_error());
    }

    #[test]
    fn test_runtime_timeout_hint() {
        let err = Error::runtime_connect_timeout(60_000);
        assert!(err.to_string().contains("make sure the project is running"));
        assert!(err.is_timeout());
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_orchestration_messages() {
        assert_eq!(
            Error::PortInUse { port: 9520 }.to_string(),
            "Port 9520 is in use, please specify another port"
        );
        assert_eq!(Error::CliPathNotFound.to_string(), "cliPath is not provided");
        assert_eq!(
            Error::project_not_found("/nope").to_string(),
            "Project path /nope doesn't exist"
        );
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("refused").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
