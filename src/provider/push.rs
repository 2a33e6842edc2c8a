//! Push-event handler table.
//!
//! Reserved push events update [`ConnectionState`](super::ConnectionState)
//! and emit the matching public events. The table is an explicit map from
//! event name to handler, checked at construction to cover every reserved
//! name. Unknown names are re-emitted to page listeners unchanged.
//!
//! | Push event | Public events |
//! |------------|---------------|
//! | `connect` | `connect` (on transition) |
//! | `disconnect` | `accountsChanged []`, `disconnect`, `close` |
//! | `unlock` / `lock` | none |
//! | `accountsChanged` | `accountsChanged` (when the selection moved) |
//! | `chainChanged` | `connect`, `chainChanged`, `networkChanged` (as changed) |
//! | `defaultWalletChanged` | `defaultWalletChanged` |
//! | `providerChanged` | `providerChanged` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::error::{Error, Result, RpcError};
use crate::protocol::ChainChange;
use crate::protocol::event::{accounts_from, names};

use super::core::ProviderInner;

// ============================================================================
// Types
// ============================================================================

type Handler = fn(&ProviderInner, &Value);

/// Name → handler map for reserved push events.
pub(crate) struct PushTable {
    handlers: FxHashMap<&'static str, Handler>,
}

impl fmt::Debug for PushTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("PushTable").field("handlers", &events).finish()
    }
}

impl PushTable {
    /// Builds the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a reserved event has no handler.
    pub(crate) fn new() -> Result<Self> {
        let entries: [(&'static str, Handler); 8] = [
            (names::CONNECT, on_connect),
            (names::DISCONNECT, on_disconnect),
            (names::UNLOCK, on_unlock),
            (names::LOCK, on_lock),
            (names::ACCOUNTS_CHANGED, on_accounts_changed),
            (names::CHAIN_CHANGED, on_chain_changed),
            (names::DEFAULT_WALLET_CHANGED, on_default_wallet_changed),
            (names::PROVIDER_CHANGED, on_provider_changed),
        ];
        let handlers: FxHashMap<&'static str, Handler> = entries.into_iter().collect();

        if let Some(missing) = names::RESERVED.iter().find(|name| !handlers.contains_key(*name)) {
            return Err(Error::config(format!("no handler for reserved push event {missing}")));
        }

        Ok(Self { handlers })
    }

    /// Handles one push event.
    pub(crate) fn dispatch(&self, inner: &ProviderInner, event: &str, data: &Value) {
        match self.handlers.get(event) {
            Some(handler) => handler(inner, data),
            None => {
                inner.emitter.emit(event, data);
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn on_connect(inner: &ProviderInner, data: &Value) {
    let chain_id = {
        let mut state = inner.state.write();
        if !state.connect() {
            return;
        }
        state.chain_id.clone()
    };

    let chain_id = chain_id
        .map(Value::String)
        .or_else(|| data.get("chainId").cloned())
        .unwrap_or(Value::Null);
    inner.emitter.emit(names::CONNECT, &json!({ "chainId": chain_id }));
}

fn on_disconnect(inner: &ProviderInner, _data: &Value) {
    inner.state.write().disconnect();

    let error = RpcError::disconnected().to_value();
    inner.emitter.emit(names::ACCOUNTS_CHANGED, &json!([]));
    inner.emitter.emit(names::DISCONNECT, &error);
    inner.emitter.emit(names::CLOSE, &error);
}

fn on_unlock(inner: &ProviderInner, _data: &Value) {
    inner.state.write().is_unlocked = true;
}

fn on_lock(inner: &ProviderInner, _data: &Value) {
    inner.state.write().is_unlocked = false;
}

fn on_accounts_changed(inner: &ProviderInner, data: &Value) {
    let accounts = accounts_from(data);
    if !inner.state.write().set_accounts(accounts.clone()) {
        return;
    }
    inner.emitter.emit(names::ACCOUNTS_CHANGED, &json!(accounts));
}

fn on_chain_changed(inner: &ProviderInner, data: &Value) {
    let change: ChainChange = serde_json::from_value(data.clone()).unwrap_or_default();
    let (update, chain_id, network_version) = {
        let mut state = inner.state.write();
        let update = state.set_chain(change.chain, change.network_version);
        (update, state.chain_id.clone(), state.network_version.clone())
    };

    if update.connected {
        inner.emitter.emit(names::CONNECT, &json!({ "chainId": chain_id }));
    }
    if update.chain {
        inner.emitter.emit(names::CHAIN_CHANGED, &json!(chain_id));
    }
    if update.network {
        inner.emitter.emit(names::NETWORK_CHANGED, &json!(network_version));
    }
}

fn on_default_wallet_changed(inner: &ProviderInner, data: &Value) {
    let wallet = data.as_str().map_or_else(|| data.to_string(), str::to_string);
    inner.config.notifier.default_wallet_changed(&wallet);
    inner.emitter.emit(names::DEFAULT_WALLET_CHANGED, data);
}

fn on_provider_changed(inner: &ProviderInner, data: &Value) {
    inner.emitter.emit(names::PROVIDER_CHANGED, data);
}

// ============================================================================
// Tests
// ============================================================================
