//! Router-mode provider.
//!
//! A [`RouterProvider`] wraps the strict [`Provider`] and a
//! [`ProviderRegistry`]. When the privileged context designates a
//! discovered provider (by `rdns`, through a `providerChanged` push event),
//! every later call is forwarded to it; with no designation the strict
//! provider serves the call itself.
//!
//! # Forwarding Rules
//!
//! | Selection | `request` | `on` / properties |
//! |-----------|-----------|-------------------|
//! | none | strict provider, with `{providers}` routing context | strict provider |
//! | delegate | delegate (revoke method also clears the selection) | delegate |
//!
//! The selection is read on every call, never cached. Calls already handed
//! to a previous selection are not affected by a switch.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::discovery::{ProviderDetail, ProviderRegistry};
use crate::error::RpcResult;
use crate::identifiers::ListenerId;
use crate::protocol::RequestEnvelope;
use crate::protocol::event::{names as events, rdns_from};
use crate::protocol::method::names as methods;
use crate::provider::{Listener, Provider, SELF_MARKER, WalletProvider};

// ============================================================================
// RouterProvider
// ============================================================================

struct RouterInner {
    provider: Provider,
    registry: Arc<ProviderRegistry>,
    current: RwLock<Option<ProviderDetail>>,
    /// Listeners installed on a delegate, so removal reaches the same object.
    delegated: Mutex<FxHashMap<ListenerId, Arc<dyn WalletProvider>>>,
}

/// Provider that forwards to the currently designated discovered provider.
///
/// Cheap to clone; clones share one selection.
#[derive(Clone)]
pub struct RouterProvider {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for RouterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.inner.current.read().as_ref().map(|d| d.info.rdns.clone());
        f.debug_struct("RouterProvider")
            .field("current", &current)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl RouterProvider {
    /// Creates a router over `provider` and starts following its
    /// `providerChanged` events.
    #[must_use]
    pub fn new(provider: Provider, registry: Arc<ProviderRegistry>) -> Self {
        let router = Self {
            inner: Arc::new(RouterInner {
                provider,
                registry,
                current: RwLock::new(None),
                delegated: Mutex::new(FxHashMap::default()),
            }),
        };

        let weak = Arc::downgrade(&router.inner);
        router.inner.provider.on_internal(
            events::PROVIDER_CHANGED,
            Arc::new(move |data| {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.designate(rdns_from(data).as_deref());
                }
            }),
        );

        router
    }

    /// Resolves `rdns` against the registry and makes the match current.
    ///
    /// `None`, or an `rdns` with no match, selects the strict provider. An
    /// unmatched `rdns` also tells the privileged context to reset its
    /// stale preference.
    pub fn designate(&self, rdns: Option<&str>) -> Option<ProviderDetail> {
        let found = rdns.and_then(|rdns| self.inner.registry.find(rdns));
        *self.inner.current.write() = found.clone();

        match (rdns, &found) {
            (Some(rdns), Some(_)) => debug!(rdns, "Routing to discovered provider"),
            (Some(rdns), None) => {
                info!(rdns, "Designated provider not discovered, serving locally");
                self.inner.provider.notify(
                    RequestEnvelope::new(methods::RESET_PROVIDER_SELECTION).with_params(json!([rdns])),
                );
            }
            (None, _) => debug!("Routing cleared"),
        }
        found
    }

    /// The current delegate, if any.
    #[must_use]
    pub fn current(&self) -> Option<ProviderDetail> {
        self.inner.current.read().clone()
    }

    /// Drops the selection; later calls are served locally.
    pub fn clear(&self) {
        self.inner.current.write().take();
    }

    /// The strict provider.
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &Provider {
        &self.inner.provider
    }

    /// The registry selections are resolved against.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    fn delegate(&self) -> Option<Arc<dyn WalletProvider>> {
        self.inner.current.read().as_ref().map(|d| Arc::clone(&d.provider))
    }

    /// Submits a request to the current selection.
    ///
    /// A revoke-permissions call made through this method demotes the
    /// delegate before forwarding. Calls made on the delegate directly are
    /// not observed.
    ///
    /// # Errors
    ///
    /// The selected provider's error, unchanged. Nothing is retried.
    pub async fn request(&self, mut envelope: RequestEnvelope) -> RpcResult<Value> {
        let Some(detail) = self.current() else {
            if !self.inner.registry.is_empty() {
                envelope.context = Some(json!({ "providers": self.inner.registry.summaries() }));
            }
            return self.inner.provider.request(envelope).await;
        };

        if envelope.method == self.inner.provider.revoke_method() {
            self.revoke(&detail);
        }
        detail.provider.request(envelope).await
    }

    fn revoke(&self, detail: &ProviderDetail) {
        let mut current = self.inner.current.write();
        if current.as_ref().is_some_and(|c| c.same_provider(&detail.provider)) {
            current.take();
        }
        drop(current);

        info!(rdns = %detail.info.rdns, "Delegate revoked, serving locally");
        self.inner.provider.notify(
            RequestEnvelope::new(methods::PROVIDER_REVOKED).with_params(json!([detail.info.rdns])),
        );
    }
}

#[async_trait]
impl WalletProvider for RouterProvider {
    async fn request(&self, envelope: RequestEnvelope) -> RpcResult<Value> {
        RouterProvider::request(self, envelope).await
    }

    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        match self.delegate() {
            Some(delegate) => {
                let id = delegate.on(event, listener);
                self.inner.delegated.lock().insert(id, delegate);
                id
            }
            None => self.inner.provider.on(event, listener),
        }
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let delegate = self.inner.delegated.lock().remove(&id);
        match delegate {
            Some(delegate) => delegate.remove_listener(event, id),
            None => self.inner.provider.remove_listener(event, id),
        }
    }

    fn property(&self, name: &str) -> Option<Value> {
        if name == SELF_MARKER {
            return Some(Value::Bool(true));
        }
        match self.delegate() {
            Some(delegate) => delegate.property(name),
            None => self.inner.provider.property(name),
        }
    }

    fn set_property(&self, name: &str, value: Value) {
        match self.delegate() {
            Some(delegate) => delegate.set_property(name, value),
            None => self.inner.provider.set_property(name, value),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::testing::{
        FakeBackground, StubProvider, flush, loaded_page, recorder, rejected, test_info, test_provider,
    };
    use std::time::Duration;

    const OTHER: &str = "io.example.other";

    struct Fixture {
        background: FakeBackground,
        router: RouterProvider,
        stub: Arc<StubProvider>,
    }

    async fn fixture() -> Fixture {
        let background = FakeBackground::new();
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        let registry = Arc::new(ProviderRegistry::new(provider.info().uuid, None));
        let stub = Arc::new(StubProvider::new(OTHER));
        let handle: Arc<dyn WalletProvider> = Arc::clone(&stub) as Arc<dyn WalletProvider>;
        registry.register(ProviderDetail::new(test_info(OTHER), handle));

        Fixture {
            background,
            router: RouterProvider::new(provider, registry),
            stub,
        }
    }

    async fn received(background: &FakeBackground, method: &str) {
        tokio::time::timeout(Duration::from_secs(2), background.wait_for(method, 1))
            .await
            .expect("notification sent");
    }

    #[tokio::test]
    async fn test_designated_provider_serves_requests() {
        let f = fixture().await;
        assert!(f.router.designate(Some(OTHER)).is_some());

        let result = f.router.request(RequestEnvelope::new("eth_chainId")).await;
        assert_eq!(result, Ok(json!(OTHER)));
        assert_eq!(f.stub.methods(), vec!["eth_chainId".to_string()]);
        assert_eq!(f.background.count("eth_chainId"), 0);
    }

    #[tokio::test]
    async fn test_revoke_demotes_delegate() {
        let f = fixture().await;
        f.router.designate(Some(OTHER));

        let result = f
            .router
            .request(RequestEnvelope::new(methods::WALLET_REVOKE_PERMISSIONS))
            .await;
        assert_eq!(result, Ok(json!(OTHER)));
        assert_eq!(f.stub.methods(), vec![methods::WALLET_REVOKE_PERMISSIONS.to_string()]);
        assert!(f.router.current().is_none());

        received(&f.background, methods::PROVIDER_REVOKED).await;
        let notice = f
            .background
            .requests()
            .into_iter()
            .find(|r| r.method == methods::PROVIDER_REVOKED)
            .expect("revoked notice");
        assert_eq!(notice.params, Some(json!([OTHER])));

        f.router.request(RequestEnvelope::new("eth_chainId")).await.expect("local");
        assert_eq!(f.background.count("eth_chainId"), 1);
        assert_eq!(f.stub.methods().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_designation_resets_preference() {
        let f = fixture().await;
        f.router.designate(Some(OTHER));
        assert!(f.router.designate(Some("io.example.gone")).is_none());
        assert!(f.router.current().is_none());

        received(&f.background, methods::RESET_PROVIDER_SELECTION).await;
        let notice = f
            .background
            .requests()
            .into_iter()
            .find(|r| r.method == methods::RESET_PROVIDER_SELECTION)
            .expect("reset notice");
        assert_eq!(notice.params, Some(json!(["io.example.gone"])));
    }

    #[tokio::test]
    async fn test_provider_changed_push_switches_selection() {
        let f = fixture().await;
        let (log, listener) = recorder();
        f.router.provider().on(events::PROVIDER_CHANGED, listener);

        f.background.push(events::PROVIDER_CHANGED, json!({ "rdns": OTHER }));
        flush(f.router.provider()).await;
        assert_eq!(f.router.current().map(|d| d.info.rdns), Some(OTHER.to_string()));
        assert_eq!(*log.lock(), vec![json!({ "rdns": OTHER })]);

        f.background.push(events::PROVIDER_CHANGED, json!({ "rdns": null }));
        flush(f.router.provider()).await;
        assert!(f.router.current().is_none());
        assert_eq!(f.background.count(methods::RESET_PROVIDER_SELECTION), 0);
    }

    #[tokio::test]
    async fn test_local_requests_carry_known_providers() {
        let f = fixture().await;
        f.router.request(RequestEnvelope::new("eth_accounts")).await.expect("local");

        let sent = f
            .background
            .requests()
            .into_iter()
            .find(|r| r.method == "eth_accounts")
            .expect("sent");
        let providers = &sent.context.expect("context")["providers"];
        assert_eq!(providers[0]["rdns"], OTHER);
        assert_eq!(providers[0]["name"], "Test Wallet");
    }

    #[tokio::test]
    async fn test_delegate_error_is_not_retried_locally() {
        let f = fixture().await;
        f.stub.set_result(Err(rejected()));
        f.router.designate(Some(OTHER));

        let err = f
            .router
            .request(RequestEnvelope::new("eth_sendTransaction"))
            .await
            .expect_err("rejected");
        assert_eq!(err.code, codes::USER_REJECTED);
        assert_eq!(f.background.count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_properties_follow_selection_per_access() {
        let f = fixture().await;
        f.stub.set_property("chainId", json!("0x89"));
        let router: &dyn WalletProvider = &f.router;

        assert_eq!(router.property("chainId"), Some(Value::Null));
        f.router.designate(Some(OTHER));
        assert_eq!(router.property("chainId"), Some(json!("0x89")));
        assert!(router.is_self_marked());

        router.set_property("custom", json!(1));
        assert_eq!(f.stub.property("custom"), Some(json!(1)));

        f.router.clear();
        assert_eq!(router.property("custom"), None);
    }

    #[tokio::test]
    async fn test_listener_removed_where_installed() {
        let f = fixture().await;
        f.router.designate(Some(OTHER));
        let router: &dyn WalletProvider = &f.router;

        let (log, listener) = recorder();
        let id = router.on("message", listener);
        f.router.clear();

        assert!(f.stub.emit("message", &json!(1)));
        assert!(router.remove_listener("message", id));
        assert!(!f.stub.emit("message", &json!(2)));
        assert_eq!(*log.lock(), vec![json!(1)]);
    }
}
