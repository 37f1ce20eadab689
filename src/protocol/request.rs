//! Request, Response and inbound message types.
//!
//! Defines the message format for requests and responses exchanged on both
//! the runtime and devtool connections.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Event;

// ============================================================================
// Request
// ============================================================================

/// A request from the client to a remote peer.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "method": "Namespace.methodName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Method in `Namespace.methodName` format.
    pub method: String,

    /// Method parameters (an object, `{}` when empty).
    pub params: Value,
}

impl Request {
    /// Creates a new request with an auto-generated id.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self::with_id(RequestId::generate(), method, params)
    }

    /// Creates a new request with a specific id.
    ///
    /// A `null` params value is normalized to an empty object.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Error object carried by a failed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteError {
    /// Human-readable failure reason.
    #[serde(default)]
    pub message: String,
}

/// A response from a remote peer.
///
/// # Format
///
/// ```json
/// { "id": "uuid", "result": { ... } }
/// { "id": "uuid", "error": { "message": "..." } }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result data (if success).
    pub result: Option<Value>,

    /// Error object (if failure).
    pub error: Option<RemoteError>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] with the peer's message if the response was
    /// an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::remote(error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// A parsed inbound message.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Reply to a previously sent request.
    Response(Response),
    /// Unsolicited broadcast notification.
    Event(Event),
}

impl Incoming {
    /// Parses one inbound text frame.
    ///
    /// Messages without a usable `id` are events; everything else is a
    /// response, even if it also carries a `method` field.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON
    /// - [`Error::Protocol`] if an event has no method name
    pub fn parse(text: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(text)?;

        if let Some(id) = value.get("id").and_then(RequestId::from_value) {
            let error = match value.get_mut("error").map(Value::take) {
                None | Some(Value::Null) => None,
                Some(Value::String(message)) => Some(RemoteError { message }),
                Some(other) => Some(serde_json::from_value(other).unwrap_or_default()),
            };
            let result = value.get_mut("result").map(Value::take);
            return Ok(Self::Response(Response { id, result, error }));
        }

        let method = value
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("message has neither id nor method"))?
            .to_string();
        let params = value.get_mut("params").map(Value::take).unwrap_or(Value::Null);

        Ok(Self::Event(Event::new(method, params)))
    }
}

// ============================================================================
// Tests
// ============================================================================
