//! Pre-EIP-1193 entry points kept for older dapps.
//!
//! | Call | Maps to |
//! |------|---------|
//! | `enable()` | `eth_requestAccounts` |
//! | `net_version()` | `net_version` |
//! | `send(method, params)` | `request`, wrapped as `{id: null, jsonrpc, result}` |
//! | `send_sync(payload)` | cached state for `eth_accounts` / `eth_coinbase` |
//! | `send_async(payload)` | `request` per payload, errors folded into replies |

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{RpcError, RpcResult};
use crate::protocol::method::names as methods;
use crate::protocol::{JsonRpcPayload, JsonRpcReply, RequestEnvelope};

use super::core::Provider;

// ============================================================================
// Types
// ============================================================================

/// Argument of [`Provider::send_async`]: one payload or a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyPayload {
    /// A single payload.
    Single(JsonRpcPayload),
    /// Several payloads, answered together.
    Batch(Vec<JsonRpcPayload>),
}

/// Outcome of [`Provider::send_async`], shaped like the legacy callback
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyReply {
    /// `(error, reply)` for a single payload.
    Single {
        /// The error, if the request failed.
        error: Option<RpcError>,
        /// Pass-through fields plus `method` and `result` or `error`.
        reply: Value,
    },
    /// One reply per batch item, in order. Item failures appear as an
    /// `error` field; the batch itself never fails.
    Batch(Vec<Value>),
}

// ============================================================================
// Legacy Methods
// ============================================================================

impl Provider {
    /// Requests account access.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub async fn enable(&self) -> RpcResult<Value> {
        self.request(RequestEnvelope::new(methods::ETH_REQUEST_ACCOUNTS)).await
    }

    /// Requests the network version.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub async fn net_version(&self) -> RpcResult<Value> {
        self.request(RequestEnvelope::new(methods::NET_VERSION)).await
    }

    /// Always `true`; connectivity is reported through events.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        true
    }

    /// Cached unlock flag.
    #[must_use]
    pub fn metamask_is_unlocked(&self) -> bool {
        self.state().is_unlocked
    }

    /// Async `send(method, params)`.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub async fn send(&self, method: &str, params: Option<Value>) -> RpcResult<JsonRpcReply> {
        let mut envelope = RequestEnvelope::new(method);
        envelope.params = params;
        let result = self.request(envelope).await?;
        Ok(JsonRpcReply {
            id: Value::Null,
            jsonrpc: "2.0".to_string(),
            result,
        })
    }

    /// Synchronous `send(payload)`, answered from cached state.
    ///
    /// # Errors
    ///
    /// Returns `4200` for any method other than `eth_accounts` and
    /// `eth_coinbase`.
    pub fn send_sync(&self, payload: &JsonRpcPayload) -> RpcResult<JsonRpcReply> {
        let selected = self.selected_address();
        let result = match payload.method.as_str() {
            methods::ETH_ACCOUNTS => json!(selected.into_iter().collect::<Vec<_>>()),
            methods::ETH_COINBASE => selected.map_or(Value::Null, Value::String),
            other => return Err(RpcError::unsupported_method(other)),
        };

        Ok(JsonRpcReply {
            id: payload.id(),
            jsonrpc: payload.jsonrpc(),
            result,
        })
    }

    /// Payload-style `sendAsync`.
    pub async fn send_async(&self, payload: LegacyPayload) -> LegacyReply {
        match payload {
            LegacyPayload::Single(payload) => {
                let (error, reply) = self.send_payload(&payload).await;
                LegacyReply::Single { error, reply }
            }
            LegacyPayload::Batch(payloads) => {
                let replies = join_all(payloads.iter().map(|payload| self.send_payload(payload))).await;
                LegacyReply::Batch(replies.into_iter().map(|(_, reply)| reply).collect())
            }
        }
    }

    async fn send_payload(&self, payload: &JsonRpcPayload) -> (Option<RpcError>, Value) {
        let mut envelope = RequestEnvelope::new(payload.method.clone());
        envelope.params = payload.params.clone();

        match self.request(envelope).await {
            Ok(result) => (None, payload.reply("result", result)),
            Err(e) => {
                let reply = payload.reply("error", e.to_value());
                (Some(e), reply)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
