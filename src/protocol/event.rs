//! Push event message types.
//!
//! Push events are unsolicited notifications sent from the privileged
//! context to the page. They carry no correlation id.
//!
//! # Reserved Events
//!
//! | Event | Payload |
//! |-------|---------|
//! | `connect` | `{ "chainId": "0x1" }` |
//! | `disconnect` | none |
//! | `unlock` / `lock` | none |
//! | `accountsChanged` | `["0xabc", ...]` or `null` |
//! | `chainChanged` | `{ "chain": "0x1", "networkVersion": "1" }` |
//! | `defaultWalletChanged` | wallet name string |
//! | `providerChanged` | `{ "rdns": "com.example" }` or `{ "rdns": null }` |
//!
//! Any other event name is re-emitted to page listeners verbatim.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event Names
// ============================================================================

/// Reserved push event names.
pub mod names {
    /// Connectivity established.
    pub const CONNECT: &str = "connect";
    /// Connectivity lost.
    pub const DISCONNECT: &str = "disconnect";
    /// Wallet unlocked.
    pub const UNLOCK: &str = "unlock";
    /// Wallet locked.
    pub const LOCK: &str = "lock";
    /// Account list changed.
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    /// Chain changed.
    pub const CHAIN_CHANGED: &str = "chainChanged";
    /// Default wallet preference changed.
    pub const DEFAULT_WALLET_CHANGED: &str = "defaultWalletChanged";
    /// Router selection changed.
    pub const PROVIDER_CHANGED: &str = "providerChanged";

    /// Public-only event: network version changed.
    pub const NETWORK_CHANGED: &str = "networkChanged";
    /// Public-only event: legacy alias of `disconnect`.
    pub const CLOSE: &str = "close";
    /// Public event that also triggers the chain-switch notice.
    pub const CHAIN_SWITCHED: &str = "wallet:chainChanged";

    /// All names handled internally by the provider.
    pub const RESERVED: &[&str] = &[
        CONNECT,
        DISCONNECT,
        UNLOCK,
        LOCK,
        ACCOUNTS_CHANGED,
        CHAIN_CHANGED,
        DEFAULT_WALLET_CHANGED,
        PROVIDER_CHANGED,
    ];
}

// ============================================================================
// PushEvent
// ============================================================================

/// An unsolicited message from the privileged context.
///
/// # Format
///
/// ```json
/// { "type": "event", "event": "accountsChanged", "data": ["0xabc"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event name.
    pub event: String,

    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    /// Creates a push event.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Returns `true` if the event name is handled internally.
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        names::RESERVED.contains(&self.event.as_str())
    }
}

// ============================================================================
// Typed Payloads
// ============================================================================

/// Payload of `chainChanged`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainChange {
    /// Hex chain id.
    #[serde(default)]
    pub chain: Option<String>,

    /// Decimal network version.
    #[serde(default)]
    pub network_version: Option<String>,
}

/// Extracts the account list from an `accountsChanged` payload.
///
/// `null` and non-array payloads yield an empty list; non-string entries
/// are dropped.
#[must_use]
pub fn accounts_from(data: &Value) -> Vec<String> {
    data.as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts the `rdns` field of a `providerChanged` payload.
#[must_use]
pub fn rdns_from(data: &Value) -> Option<String> {
    data.get("rdns")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Tests
// ============================================================================
