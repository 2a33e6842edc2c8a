//! Method names and typed payloads.
//!
//! Internal methods are the calls the provider itself makes to the
//! privileged context; public methods are listed where the provider treats
//! them specially.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ============================================================================
// Method Names
// ============================================================================

/// Method names with special meaning to the provider.
pub mod names {
    /// Announces the page to the privileged context.
    pub const TAB_CHECKIN: &str = "tabCheckin";
    /// Bootstrap state query.
    pub const GET_PROVIDER_STATE: &str = "getProviderState";
    /// Signals a competing provider on the page.
    pub const HAS_OTHER_PROVIDER: &str = "hasOtherProvider";
    /// Signals that the preferred router selection no longer resolves.
    pub const RESET_PROVIDER_SELECTION: &str = "resetProviderSelection";
    /// Signals that the selected delegate had its permissions revoked.
    pub const PROVIDER_REVOKED: &str = "providerRevoked";

    /// Legacy `enable()` target.
    pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    /// Legacy network version query.
    pub const NET_VERSION: &str = "net_version";
    /// Account list.
    pub const ETH_ACCOUNTS: &str = "eth_accounts";
    /// Primary account.
    pub const ETH_COINBASE: &str = "eth_coinbase";
    /// Read-only contract call.
    pub const ETH_CALL: &str = "eth_call";
    /// Permission revocation.
    pub const WALLET_REVOKE_PERMISSIONS: &str = "wallet_revokePermissions";
}

// ============================================================================
// TabCheckin
// ============================================================================

/// Parameters of the `tabCheckin` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabCheckin {
    /// Page icon URL, if any was found.
    pub icon: Option<String>,
    /// Page display name.
    pub name: String,
    /// Page origin.
    pub origin: String,
}

// ============================================================================
// ProviderStateSnapshot
// ============================================================================

/// Result of `getProviderState`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStateSnapshot {
    /// Hex chain id.
    #[serde(default)]
    pub chain_id: Option<String>,
    /// Connected accounts.
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
    /// Decimal network version.
    #[serde(default)]
    pub network_version: Option<String>,
    /// Whether the wallet is unlocked.
    #[serde(default)]
    pub is_unlocked: bool,
}

// ============================================================================
// Legacy JSON-RPC Payloads
// ============================================================================

/// A legacy `send`/`sendAsync` payload.
///
/// Fields other than `method` and `params` (typically `id` and `jsonrpc`)
/// are carried through to the reply untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcPayload {
    /// Method name.
    pub method: String,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Pass-through fields.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl JsonRpcPayload {
    /// Creates a payload with a numeric id.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        let mut rest = Map::new();
        rest.insert("id".to_string(), json!(id));
        rest.insert("jsonrpc".to_string(), json!("2.0"));
        Self {
            method: method.into(),
            params: None,
            rest,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Returns the payload id, or `null`.
    #[must_use]
    pub fn id(&self) -> Value {
        self.rest.get("id").cloned().unwrap_or(Value::Null)
    }

    /// Returns the `jsonrpc` version, defaulting to `"2.0"`.
    #[must_use]
    pub fn jsonrpc(&self) -> String {
        self.rest
            .get("jsonrpc")
            .and_then(Value::as_str)
            .unwrap_or("2.0")
            .to_string()
    }

    /// Builds a `sendAsync` reply object: pass-through fields plus
    /// `method` and one of `result`/`error`.
    #[must_use]
    pub fn reply(&self, field: &str, value: Value) -> Value {
        let mut reply = self.rest.clone();
        reply.insert("method".to_string(), json!(self.method));
        reply.insert(field.to_string(), value);
        Value::Object(reply)
    }
}

/// A legacy JSON-RPC reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcReply {
    /// Request id, `null` when absent.
    pub id: Value,
    /// Protocol version.
    pub jsonrpc: String,
    /// Result value.
    pub result: Value,
}

// ============================================================================
// Tests
// ============================================================================
