//! Error types for the in-page provider.
//!
//! This module defines two layers of errors:
//!
//! - [`enum@Error`]: the crate-internal error used by the transport,
//!   pipeline and configuration layers.
//! - [`RpcError`]: the normalized `{code, message, data?}` shape every page
//!   caller ultimately observes.
//!
//! # Usage
//!
//! ```ignore
//! use inpage_provider::{RequestEnvelope, RpcError};
//!
//! async fn example(provider: &Provider) -> Result<(), RpcError> {
//!     let accounts = provider.request(RequestEnvelope::new("eth_accounts")).await?;
//!     println!("{accounts}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::AlreadyInstalled`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::InvalidRequest`], [`Error::Protocol`], [`Error::UnsupportedMethod`] |
//! | Remote | [`Error::Rpc`] |
//! | Pipeline | [`Error::GateClosed`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Aliases
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

/// Result type alias for operations surfaced to page callers.
pub type RpcResult<T> = StdResult<T, RpcError>;

// ============================================================================
// Error Codes
// ============================================================================

/// Standard JSON-RPC and provider error codes.
pub mod codes {
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameter(s).
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL: i64 = -32603;
    /// The user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// The requested account and/or method has not been authorized.
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the requested method.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// The provider is not connected to the requested chain.
    pub const CHAIN_DISCONNECTED: i64 = 4901;
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when provider configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The process-wide provider installation already exists.
    #[error("Provider already installed")]
    AlreadyInstalled,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Channel to the privileged context could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out establishing the channel.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Channel to the privileged context closed.
    ///
    /// Every request pending at close time fails with this error.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or absent request envelope.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the envelope.
        message: String,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Method not available through the called surface.
    #[error("Unsupported method: {method}")]
    UnsupportedMethod {
        /// The method name.
        method: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The privileged context reported a failure.
    #[error("{0}")]
    Rpc(RpcError),

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// The readiness gate was dropped while a call was still queued.
    #[error("Readiness gate closed before the call was admitted")]
    GateClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

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

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an invalid request error.
    #[inline]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
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

    /// Creates an unsupported method error.
    #[inline]
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::ChannelClosed(_)
        )
    }

    /// Returns `true` if the privileged context reported this error.
    #[inline]
    #[must_use]
    pub fn is_rpc_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

// ============================================================================
// RpcError
// ============================================================================

/// Normalized error shape returned to page callers.
///
/// # Format
///
/// ```json
/// { "code": 4001, "message": "User rejected the request.", "data": { ... } }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,

    /// Human readable message.
    pub message: String,

    /// Optional extra payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error with the given code and message.
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a data payload.
    #[inline]
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32600` invalid request.
    #[must_use]
    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, default_message(codes::INVALID_REQUEST))
    }

    /// `-32603` internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    /// `4200` unsupported method.
    #[must_use]
    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            codes::UNSUPPORTED_METHOD,
            format!("The provider does not support the method \"{method}\" synchronously."),
        )
    }

    /// `4900` disconnected.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::new(codes::DISCONNECTED, default_message(codes::DISCONNECTED))
    }

    /// Normalizes an arbitrary error payload reported by the privileged context.
    ///
    /// Objects carrying an integer `code` keep their code, message and data.
    /// Anything else becomes an internal error with the original value kept
    /// under `data.originalError`.
    #[must_use]
    pub fn normalize(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64);

        let Some(code) = code else {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| default_message(codes::INTERNAL).to_string());
            return Self::internal(message).with_data(json!({ "originalError": value }));
        };

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_message(code).to_string());

        Self {
            code,
            message,
            data: value.get("data").filter(|d| !d.is_null()).cloned(),
        }
    }

    /// Serializes this error as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "code": self.code }))
    }
}

/// Standard message for a known code.
fn default_message(code: i64) -> &'static str {
    match code {
        codes::INVALID_REQUEST => "Invalid request.",
        codes::METHOD_NOT_FOUND => "The method does not exist / is not available.",
        codes::INVALID_PARAMS => "Invalid method parameter(s).",
        codes::INTERNAL => "Internal JSON-RPC error.",
        codes::USER_REJECTED => "User rejected the request.",
        codes::UNAUTHORIZED => {
            "The requested account and/or method has not been authorized by the user."
        }
        codes::UNSUPPORTED_METHOD => "The requested method is not supported by this provider.",
        codes::DISCONNECTED => "The provider is disconnected from all chains.",
        codes::CHAIN_DISCONNECTED => "The provider is disconnected from the specified chain.",
        _ => "Unspecified error message.",
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc(rpc) => rpc,
            Error::InvalidRequest { message } => {
                Self::invalid_request().with_data(json!({ "reason": message }))
            }
            Error::UnsupportedMethod { method } => Self::unsupported_method(&method),
            Error::ConnectionClosed => Self::disconnected(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("port closed");
        assert_eq!(err.to_string(), "Connection failed: port closed");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection_timeout(100).is_connection_error());
        assert!(!Error::config("bad").is_connection_error());
        assert!(!Error::Rpc(RpcError::invalid_request()).is_connection_error());
    }

    #[test]
    fn test_normalize_keeps_code_message_and_data() {
        let raw = json!({ "code": 4001, "message": "nope", "data": { "x": 1 } });
        let err = RpcError::normalize(&raw);
        assert_eq!(err.code, 4001);
        assert_eq!(err.message, "nope");
        assert_eq!(err.data, Some(json!({ "x": 1 })));
    }

    #[test]
    fn test_normalize_fills_default_message() {
        let err = RpcError::normalize(&json!({ "code": 4100 }));
        assert_eq!(err.code, codes::UNAUTHORIZED);
        assert!(err.message.contains("not been authorized"));
        assert!(err.data.is_none());
    }

    #[test]
    fn test_normalize_non_rpc_value_becomes_internal() {
        let err = RpcError::normalize(&json!("boom"));
        assert_eq!(err.code, codes::INTERNAL);
        assert_eq!(err.data, Some(json!({ "originalError": "boom" })));

        let err = RpcError::normalize(&json!({ "message": "broken" }));
        assert_eq!(err.code, codes::INTERNAL);
        assert_eq!(err.message, "broken");
    }

    #[test]
    fn test_from_error_maps_taxonomy() {
        let rpc: RpcError = Error::invalid_request("empty").into();
        assert_eq!(rpc.code, codes::INVALID_REQUEST);

        let rpc: RpcError = Error::ConnectionClosed.into();
        assert_eq!(rpc.code, codes::DISCONNECTED);

        let rpc: RpcError = Error::GateClosed.into();
        assert_eq!(rpc.code, codes::INTERNAL);

        let remote = RpcError::new(4001, "rejected");
        let rpc: RpcError = Error::Rpc(remote.clone()).into();
        assert_eq!(rpc, remote);
    }

    #[test]
    fn test_rpc_error_serialization_skips_empty_data() {
        let value = RpcError::new(4001, "rejected").to_value();
        assert_eq!(value, json!({ "code": 4001, "message": "rejected" }));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
