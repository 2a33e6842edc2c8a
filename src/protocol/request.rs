//! Request envelope and Response message types.
//!
//! Defines what a page caller submits ([`RequestEnvelope`]) and how the
//! bridge frames it on the wire ([`Request`], [`Response`]).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result, RpcError};
use crate::identifiers::RequestId;

// ============================================================================
// RequestEnvelope
// ============================================================================

/// A method call as submitted by a page script.
///
/// # Format
///
/// ```json
/// { "method": "eth_accounts", "params": [], "context": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Method name; also the dedupe key.
    pub method: String,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Extra routing context attached by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl RequestEnvelope {
    /// Creates an envelope without parameters.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
            context: None,
        }
    }

    /// Sets the parameters.
    #[inline]
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets the routing context.
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Parses an untyped page payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for `null`, `false`, non-objects,
    /// or objects without a non-empty string `method`.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::invalid_request(format!(
                "expected a request object, got {value}"
            )));
        }

        let envelope: Self = serde_json::from_value(value)
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Checks the envelope is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the method is empty.
    pub fn validate(&self) -> Result<()> {
        if self.method.trim().is_empty() {
            return Err(Error::invalid_request("method must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Request
// ============================================================================

/// A correlated request from the page to the privileged context.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "type": "request",
///   "data": { "method": "eth_chainId" }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Message type marker (always "request").
    #[serde(rename = "type")]
    pub message_type: &'static str,

    /// The envelope being delivered.
    pub data: RequestEnvelope,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(data: RequestEnvelope) -> Self {
        Self::with_id(RequestId::generate(), data)
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, data: RequestEnvelope) -> Self {
        Self {
            id,
            message_type: "request",
            data,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the privileged context.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "uuid", "type": "success", "result": ["0xabc"] }
/// ```
///
/// Error:
/// ```json
/// { "id": "uuid", "type": "error", "error": { "code": 4001, "message": "..." } }
/// ```
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

    /// Raw error payload (if error).
    #[serde(default)]
    pub error: Option<Value>,
}

impl Response {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Extracts the result value, normalizing a reported failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.response_type {
            ResponseType::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseType::Error => {
                let raw = self.error.unwrap_or(Value::Null);
                Err(Error::Rpc(RpcError::normalize(&raw)))
            }
        }
    }
}

// ============================================================================
// ResponseType
// ============================================================================

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
// Tests
// ============================================================================
