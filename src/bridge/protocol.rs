//! Bridge message types.
//!
//! Messages exchanged between the Rust side and the in-page bridge script.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Request`] | Rust → Page | Command request |
//! | [`Response`] | Page → Rust | Command response (and READY) |
//! | [`Event`] | Page → Rust | Completed network response |
//!
//! Commands and events follow `module.methodName` naming.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Event emitted for every completed fetch in the page.
pub const RESPONSE_COMPLETED: &str = "network.responseCompleted";

// ============================================================================
// Command
// ============================================================================

/// Commands understood by the bridge script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Command {
    /// Scroll the tracked container to its maximum extent.
    #[serde(rename = "page.advance")]
    Advance {
        /// CSS selector overriding the automatic container choice.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },

    /// Report the page URL and title.
    #[serde(rename = "page.info")]
    Info,
}

// ============================================================================
// Request
// ============================================================================

/// A command request from Rust to the page.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "method": "page.advance",
///   "params": { "selector": "..." }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            id: RequestId::generate(),
            command,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the page.
///
/// The READY handshake is a success response carrying the nil ID.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Response type.
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error code (if error).
    #[serde(default)]
    pub error: Option<String>,

    /// Error message (if error).
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Extracts the result value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.response_type {
            ResponseType::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseType::Error => {
                let code = self.error.unwrap_or_else(|| "unknown error".to_string());
                let message = self.message.unwrap_or_else(|| code.clone());
                Err(Error::protocol(format!("{code}: {message}")))
            }
        }
    }

    /// Gets a string value from the result.
    ///
    /// Returns an empty string if the key is missing or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Successful response.
    Success,
    /// Error response.
    Error,
}

// ============================================================================
// Event
// ============================================================================

/// An event notification from the page.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "type": "event",
///   "method": "network.responseCompleted",
///   "params": { "url": "...", "status": 200, "body": "..." }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: RequestId,

    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Parses the event into a typed variant.
    ///
    /// A `network.responseCompleted` event with malformed params is returned
    /// as [`ParsedEvent::Unknown`].
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        if self.method == RESPONSE_COMPLETED
            && let Ok(completed) = serde_json::from_value::<ResponseCompleted>(self.params.clone())
        {
            return ParsedEvent::ResponseCompleted(completed);
        }

        ParsedEvent::Unknown {
            method: self.method.clone(),
            params: self.params.clone(),
        }
    }
}

/// Parsed event types.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// A fetch in the page completed.
    ResponseCompleted(ResponseCompleted),

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// ResponseCompleted
// ============================================================================

/// Params of a `network.responseCompleted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCompleted {
    /// Request URL.
    pub url: String,

    /// HTTP status code.
    #[serde(default)]
    pub status: u16,

    /// Response body, encoded per `encoding`.
    #[serde(default)]
    pub body: String,

    /// Body encoding; plain text when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<BodyEncoding>,
}

/// How a response body is carried over the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// UTF-8 text.
    Text,
    /// Standard base64.
    Base64,
}

impl ResponseCompleted {
    /// Returns the body as text.
    ///
    /// Base64 bodies are decoded; invalid UTF-8 is replaced lossily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a base64 body does not decode.
    pub fn text(&self) -> Result<String> {
        match self.encoding {
            None | Some(BodyEncoding::Text) => Ok(self.body.clone()),
            Some(BodyEncoding::Base64) => {
                let bytes = STANDARD
                    .decode(self.body.as_bytes())
                    .map_err(|e| Error::protocol(format!("Invalid base64 body: {e}")))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

// ============================================================================
// Command Results
// ============================================================================

/// Result of `page.advance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvanceResult {
    /// Scroll offset after advancing.
    pub scroll_top: f64,
    /// Scrollable height of the container.
    pub scroll_height: f64,
}

/// Result of `page.info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageInfo {
    /// Page URL.
    pub url: String,
    /// Document title.
    pub title: String,
}

// ============================================================================
// Tests
// ============================================================================
