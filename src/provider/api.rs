//! The provider surface page scripts program against.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcResult;
use crate::identifiers::ListenerId;
use crate::protocol::RequestEnvelope;

use super::core::Provider;
use super::emitter::Listener;

/// Property that is `true` on providers built by this crate.
///
/// The global binding uses it to recognize assignments of its own
/// providers.
pub const SELF_MARKER: &str = "_isPageProvider";

/// EIP-1193 style provider object.
///
/// Implemented by the strict [`Provider`](super::Provider), the
/// [`RouterProvider`](crate::router::RouterProvider), and any foreign
/// provider the page announces.
#[async_trait]
pub trait WalletProvider: Send + Sync + fmt::Debug {
    /// Submits a request.
    async fn request(&self, envelope: RequestEnvelope) -> RpcResult<Value>;

    /// Registers an event listener.
    fn on(&self, event: &str, listener: Listener) -> ListenerId;

    /// Removes an event listener. Returns `true` if it was registered.
    fn remove_listener(&self, event: &str, id: ListenerId) -> bool;

    /// Reads a property (`chainId`, `selectedAddress`, identity flags, ...).
    fn property(&self, name: &str) -> Option<Value>;

    /// Writes a property.
    fn set_property(&self, name: &str, value: Value);

    /// Returns `true` if this provider was built by this crate.
    fn is_self_marked(&self) -> bool {
        self.property(SELF_MARKER) == Some(Value::Bool(true))
    }
}

#[async_trait]
impl WalletProvider for Provider {
    async fn request(&self, envelope: RequestEnvelope) -> RpcResult<Value> {
        Provider::request(self, envelope).await
    }

    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        Provider::on(self, event, listener)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        Provider::remove_listener(self, event, id)
    }

    fn property(&self, name: &str) -> Option<Value> {
        Provider::property(self, name)
    }

    fn set_property(&self, name: &str, value: Value) {
        Provider::set_property(self, name, value);
    }
}
