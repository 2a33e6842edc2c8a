//! Provider facade and its lifecycle.
//!
//! A [`Provider`] goes through three phases:
//!
//! ```text
//! Uninitialized ──start()──► Initializing ──bootstrap settles──► Ready
//! ```
//!
//! While not ready, `request` and `on` calls are queued. The transition to
//! `Ready` happens exactly once, whether or not the `getProviderState`
//! bootstrap succeeded, and flushes both queues in submission order.
//!
//! After that, every request runs through
//! `DedupeRouter (method) → ReadyGate (visible + checked in) → Bridge`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::discovery::ProviderInfo;
use crate::error::{Error, Result, RpcError, RpcResult};
use crate::identifiers::ListenerId;
use crate::page::{Page, Visibility};
use crate::pipeline::{DedupeRouter, ReadyGate, SharedCall};
use crate::protocol::event::names as events;
use crate::protocol::method::names as methods;
use crate::protocol::{ChainChange, ProviderStateSnapshot, PushEvent, RequestEnvelope};
use crate::transport::{Bridge, Port};

use super::api::SELF_MARKER;
use super::builder::{ProviderBuilder, ProviderConfig};
use super::emitter::{EventEmitter, Listener};
use super::identity::PresentationMode;
use super::push::PushTable;
use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Gate slot satisfied while the page is visible.
const VISIBILITY_SLOT: usize = 1;

/// Gate slot satisfied once the tab has checked in.
const CHECKIN_SLOT: usize = 2;

/// Total gate slots.
const GATE_SLOTS: usize = 2;

/// Properties derived from connection state; not writable.
const STATE_PROPERTIES: &[&str] = &["chainId", "networkVersion", "selectedAddress", "_state"];

// ============================================================================
// Types
// ============================================================================

/// Lifecycle phase of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPhase {
    /// Constructed, nothing started.
    #[default]
    Uninitialized,
    /// Bridge open, bootstrap in flight.
    Initializing,
    /// Requests and listeners go straight through.
    Ready,
}

struct QueuedRequest {
    envelope: RequestEnvelope,
    reply: oneshot::Sender<RpcResult<Value>>,
}

struct QueuedListener {
    event: String,
    id: ListenerId,
    listener: Listener,
}

/// Where a page request goes.
enum Route {
    Direct(RequestEnvelope),
    Queued(oneshot::Receiver<RpcResult<Value>>),
}

/// Phase plus the pre-ready queues, guarded together.
#[derive(Default)]
struct Lifecycle {
    phase: ProviderPhase,
    requests: Vec<QueuedRequest>,
    listeners: Vec<QueuedListener>,
}

// ============================================================================
// ProviderInner
// ============================================================================

pub(crate) struct ProviderInner {
    pub(super) config: ProviderConfig,
    pub(super) page: Page,
    pub(super) bridge: Bridge,
    pub(super) state: RwLock<ConnectionState>,
    pub(super) emitter: EventEmitter,
    gate: ReadyGate,
    dedupe: DedupeRouter<Value, RpcError>,
    lifecycle: Mutex<Lifecycle>,
    phase_tx: watch::Sender<ProviderPhase>,
    push: PushTable,
    properties: RwLock<FxHashMap<String, Value>>,
}

impl ProviderInner {
    /// Runs one request through dedupe, gate and bridge.
    fn dispatch(self: &Arc<Self>, envelope: RequestEnvelope) -> SharedCall<Value, RpcError> {
        let inner = Arc::clone(self);
        let key = envelope.method.clone();
        self.dedupe.call(&key, move || inner.send_gated(envelope))
    }

    fn send_gated(
        &self,
        envelope: RequestEnvelope,
    ) -> impl Future<Output = RpcResult<Value>> + Send + 'static + use<> {
        self.sync_visibility();

        let quiet = self.config.is_quiet(&envelope.method);
        let method = envelope.method.clone();
        if !quiet {
            debug!(method, params = ?envelope.params, "[request]");
        }

        let bridge = self.bridge.clone();
        let admitted = self.gate.call(move || bridge.request(envelope));

        async move {
            let outcome = admitted.await.and_then(|result| result).map_err(RpcError::from);
            if !quiet {
                match &outcome {
                    Ok(result) => debug!(method, %result, "[request: success]"),
                    Err(e) => debug!(method, code = e.code, message = %e.message, "[request: error]"),
                }
            }
            outcome
        }
    }

    fn apply_visibility(&self, visibility: Visibility) {
        match visibility {
            Visibility::Visible => self.gate.check(VISIBILITY_SLOT),
            Visibility::Hidden => self.gate.uncheck(VISIBILITY_SLOT),
        }
    }

    fn sync_visibility(&self) {
        self.apply_visibility(self.page.visibility());
    }

    /// Sends a fire-and-forget internal request.
    ///
    /// Notices skip dedupe: two notices for one method with different
    /// params must both be delivered.
    pub(crate) fn notify(&self, envelope: RequestEnvelope) {
        let method = envelope.method.clone();
        let call = self.send_gated(envelope);
        tokio::spawn(async move {
            if let Err(e) = call.await {
                warn!(method, code = e.code, message = %e.message, "Internal request failed");
            }
        });
    }

    pub(super) fn handle_push(&self, event: &PushEvent) {
        debug!(event = %event.event, data = %event.data, "[push event]");
        self.push.dispatch(self, &event.event, &event.data);
    }

    fn handle_channel_closed(&self) {
        warn!("Channel to privileged context closed");
        self.state.write().is_permanently_disconnected = true;
        self.handle_push(&PushEvent::new(events::DISCONNECT, Value::Null));
    }

    /// Adopts the bootstrap snapshot and replays it as push events.
    fn adopt(&self, snapshot: ProviderStateSnapshot) {
        let chain_id = {
            let mut state = self.state.write();
            if snapshot.is_unlocked {
                state.is_unlocked = true;
            }
            state.connect();
            snapshot.chain_id.clone().or_else(|| state.chain_id.clone())
        };

        self.emitter.emit(events::CONNECT, &json!({ "chainId": chain_id }));

        let change = ChainChange {
            chain: snapshot.chain_id,
            network_version: snapshot.network_version,
        };
        let change = serde_json::to_value(change).unwrap_or(Value::Null);
        self.push.dispatch(self, events::CHAIN_CHANGED, &change);

        let accounts = snapshot.accounts.map_or(Value::Null, |list| json!(list));
        self.push.dispatch(self, events::ACCOUNTS_CHANGED, &accounts);
    }

    /// Enters `Ready`, installing queued listeners and dispatching queued
    /// requests in submission order.
    fn enter_ready(self: &Arc<Self>) -> Vec<(SharedCall<Value, RpcError>, oneshot::Sender<RpcResult<Value>>)> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.phase == ProviderPhase::Ready {
            return Vec::new();
        }
        lifecycle.phase = ProviderPhase::Ready;

        for queued in lifecycle.listeners.drain(..) {
            self.emitter.insert(&queued.event, queued.id, queued.listener);
        }

        let dispatched: Vec<_> = lifecycle
            .requests
            .drain(..)
            .map(|queued| (self.dispatch(queued.envelope), queued.reply))
            .collect();

        self.state.write().initialized = true;
        self.phase_tx.send_replace(ProviderPhase::Ready);
        debug!(requests = dispatched.len(), "Provider ready");
        dispatched
    }
}

// ============================================================================
// Provider
// ============================================================================

/// The provider object exposed to page scripts.
///
/// Cheap to clone; clones share one bridge, state and listener set.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("rdns", &self.inner.config.info.rdns)
            .field("phase", &self.phase())
            .field("state", &*self.inner.state.read())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::new()
    }

    /// Wires the bridge and page observers and starts initialization.
    pub(super) fn start(config: ProviderConfig, page: Page, port: Port) -> Result<Self> {
        let push = PushTable::new()?;
        let emitter = EventEmitter::new(config.max_listeners);
        let (phase_tx, _) = watch::channel(ProviderPhase::Uninitialized);

        let provider = Self {
            inner: Arc::new(ProviderInner {
                config,
                page,
                bridge: Bridge::new(port),
                state: RwLock::new(ConnectionState::default()),
                emitter,
                gate: ReadyGate::new(GATE_SLOTS),
                dedupe: DedupeRouter::new(),
                lifecycle: Mutex::new(Lifecycle::default()),
                phase_tx,
                push,
                properties: RwLock::new(FxHashMap::default()),
            }),
        };

        provider.initialize();
        Ok(provider)
    }

    fn initialize(&self) {
        self.inner.lifecycle.lock().phase = ProviderPhase::Initializing;
        self.inner.phase_tx.send_replace(ProviderPhase::Initializing);

        self.watch_visibility();
        self.attach_bridge();
        self.attach_notices();
        self.spawn_checkin();
        self.spawn_bootstrap();
    }

    fn watch_visibility(&self) {
        let mut rx = self.inner.page.watch_visibility();
        self.inner.apply_visibility(*rx.borrow_and_update());

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let visibility = *rx.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_visibility(visibility);
            }
        });
    }

    fn attach_bridge(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.set_push_handler(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_push(&event);
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.set_close_handler(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_channel_closed();
            }
        }));

        self.inner.bridge.connect();
    }

    fn attach_notices(&self) {
        let notifier = Arc::clone(&self.inner.config.notifier);
        self.on_internal(
            events::CHAIN_SWITCHED,
            Arc::new(move |chain| notifier.chain_switched(chain)),
        );
    }

    fn spawn_checkin(&self) {
        let weak = Arc::downgrade(&self.inner);
        let page = self.inner.page.clone();

        tokio::spawn(async move {
            page.dom_ready().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let checkin = page.metadata().checkin();
            let params = match serde_json::to_value(&checkin) {
                Ok(params) => params,
                Err(e) => {
                    warn!(error = %e, "Failed to encode tab check-in");
                    Value::Null
                }
            };

            let sent = inner
                .bridge
                .request(RequestEnvelope::new(methods::TAB_CHECKIN).with_params(params));
            inner.gate.check(CHECKIN_SLOT);
            drop(inner);

            match sent.await {
                Ok(_) => debug!(origin = %checkin.origin, "Tab checked in"),
                Err(e) => warn!(error = %e, "Tab check-in failed"),
            }
        });
    }

    fn spawn_bootstrap(&self) {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let outcome = inner
                .dispatch(RequestEnvelope::new(methods::GET_PROVIDER_STATE))
                .await
                .and_then(|value| {
                    serde_json::from_value::<ProviderStateSnapshot>(value)
                        .map_err(|e| RpcError::from(Error::protocol(e.to_string())))
                });

            let dispatched = inner.enter_ready();

            match outcome {
                Ok(snapshot) => inner.adopt(snapshot),
                Err(e) => warn!(code = e.code, message = %e.message, "Provider state bootstrap failed"),
            }
            drop(inner);

            for (call, reply) in dispatched {
                tokio::spawn(async move {
                    let _ = reply.send(call.await);
                });
            }
        });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> ProviderPhase {
        self.inner.lifecycle.lock().phase
    }

    /// Returns `true` once the provider is ready.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == ProviderPhase::Ready
    }

    /// Resolves once the provider is ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.inner.phase_tx.subscribe();
        let _ = rx.wait_for(|phase| *phase == ProviderPhase::Ready).await;
    }

    /// Snapshot of the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().clone()
    }

    /// Current chain id.
    #[must_use]
    pub fn chain_id(&self) -> Option<String> {
        self.inner.state.read().chain_id.clone()
    }

    /// Currently selected account.
    #[must_use]
    pub fn selected_address(&self) -> Option<String> {
        self.inner.state.read().selected_address.clone()
    }

    /// Announced identity.
    #[inline]
    #[must_use]
    pub fn info(&self) -> &ProviderInfo {
        &self.inner.config.info
    }

    /// Presentation mode chosen for this page.
    #[inline]
    #[must_use]
    pub fn presentation(&self) -> PresentationMode {
        self.inner.config.presentation
    }

    /// Method that demotes a routed delegate.
    #[inline]
    #[must_use]
    pub fn revoke_method(&self) -> &str {
        &self.inner.config.revoke_method
    }

    /// The host page.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.inner.page
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.emitter.listener_count(event)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Submits a request.
    ///
    /// Before the provider is ready the request is queued; it is dispatched
    /// when the provider becomes ready.
    ///
    /// # Errors
    ///
    /// Returns the normalized [`RpcError`]: `-32600` for an invalid
    /// envelope, the remote error for a remote failure, `4900` if the
    /// channel closed.
    pub async fn request(&self, envelope: RequestEnvelope) -> RpcResult<Value> {
        envelope.validate()?;

        let route = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase == ProviderPhase::Ready {
                Route::Direct(envelope)
            } else {
                let (reply, rx) = oneshot::channel();
                lifecycle.requests.push(QueuedRequest { envelope, reply });
                Route::Queued(rx)
            }
        };

        match route {
            Route::Direct(envelope) => self.inner.dispatch(envelope).await,
            Route::Queued(rx) => rx.await.unwrap_or_else(|_| Err(RpcError::disconnected())),
        }
    }

    /// Submits an untyped request payload.
    ///
    /// # Errors
    ///
    /// Returns `-32600` if `payload` is falsy or not a request object,
    /// otherwise as [`request`](Self::request).
    pub async fn request_value(&self, payload: Value) -> RpcResult<Value> {
        let envelope = RequestEnvelope::from_value(payload)?;
        self.request(envelope).await
    }

    /// Sends an internal request and only logs its failure.
    pub(crate) fn notify(&self, envelope: RequestEnvelope) {
        self.inner.notify(envelope);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Registers a listener. Before the provider is ready the registration
    /// is queued.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.phase == ProviderPhase::Ready {
            self.inner.emitter.insert(event, id, listener);
        } else {
            lifecycle.listeners.push(QueuedListener {
                event: event.to_string(),
                id,
                listener,
            });
        }
        id
    }

    /// Registers a listener immediately, regardless of phase.
    pub(crate) fn on_internal(&self, event: &str, listener: Listener) -> ListenerId {
        self.inner.emitter.on(event, listener)
    }

    /// Removes a listener, queued or installed.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock();
        let before = lifecycle.listeners.len();
        lifecycle
            .listeners
            .retain(|queued| !(queued.id == id && queued.event == event));
        if lifecycle.listeners.len() != before {
            return true;
        }
        drop(lifecycle);
        self.inner.emitter.remove_listener(event, id)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Reads a property: connection state, identity flags, or a value
    /// previously written with [`set_property`](Self::set_property).
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        let optional = |value: &Option<String>| value.as_ref().map_or(Value::Null, |v| json!(v));

        match name {
            "chainId" => Some(optional(&self.inner.state.read().chain_id)),
            "networkVersion" => Some(optional(&self.inner.state.read().network_version)),
            "selectedAddress" => Some(optional(&self.inner.state.read().selected_address)),
            "_state" => serde_json::to_value(&*self.inner.state.read()).ok(),
            SELF_MARKER => Some(Value::Bool(true)),
            _ => self
                .inner
                .properties
                .read()
                .get(name)
                .cloned()
                .or_else(|| self.inner.config.identity.get(name).cloned()),
        }
    }

    /// Writes a property. State-derived properties are read-only.
    pub fn set_property(&self, name: &str, value: Value) {
        if STATE_PROPERTIES.contains(&name) || name == SELF_MARKER {
            warn!(name, "Ignoring write to read-only provider property");
            return;
        }
        self.inner.properties.write().insert(name.to_string(), value);
    }

    /// Removes a written property, restoring the default.
    pub fn remove_property(&self, name: &str) -> Option<Value> {
        self.inner.properties.write().remove(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::page::{PageMetadata, ReadyState};
    use crate::testing::{FakeBackground, Reply, flush, loaded_page, recorder, test_provider};
    use proptest::prelude::*;
    use std::time::Duration;

    fn state_reply() -> Reply {
        Reply::Result(json!({
            "chainId": "0x1",
            "accounts": ["0xabc"],
            "networkVersion": "1",
            "isUnlocked": true,
        }))
    }

    #[tokio::test]
    async fn test_round_trip_does_not_mutate_state() {
        let background = FakeBackground::new();
        background.set_reply(methods::GET_PROVIDER_STATE, Reply::Error(json!({ "code": 4100 })));
        background.set_reply("eth_accounts", Reply::Result(json!(["0xabc"])));
        let provider = test_provider(loaded_page(), background.port());

        provider.wait_ready().await;
        let before = provider.state();
        let result = provider.request(RequestEnvelope::new("eth_accounts")).await;
        assert_eq!(result, Ok(json!(["0xabc"])));
        assert_eq!(provider.state(), before);
        assert_eq!(provider.selected_address(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_adopts_state_and_emits() {
        let background = FakeBackground::new();
        background.set_reply(methods::GET_PROVIDER_STATE, state_reply());
        let page = loaded_page();
        let provider = test_provider(page, background.port());

        let (log, listener) = recorder();
        for event in [events::CONNECT, events::CHAIN_CHANGED, events::ACCOUNTS_CHANGED] {
            provider.on(event, Arc::clone(&listener));
        }

        provider.wait_ready().await;
        let state = provider.state();
        assert_eq!(state.chain_id.as_deref(), Some("0x1"));
        assert_eq!(state.network_version.as_deref(), Some("1"));
        assert_eq!(state.selected_address.as_deref(), Some("0xabc"));
        assert!(state.is_unlocked);
        assert!(state.is_connected);
        assert!(state.initialized);

        assert_eq!(
            *log.lock(),
            vec![
                json!({ "chainId": "0x1" }),
                json!("0x1"),
                json!(["0xabc"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_failure_still_flushes_queues() {
        let background = FakeBackground::new();
        background.set_reply(
            methods::GET_PROVIDER_STATE,
            Reply::Error(json!({ "code": -32603, "message": "locked" })),
        );
        background.set_reply("eth_chainId", Reply::Result(json!("0x1")));
        let page = Page::new(PageMetadata::new("https://example.com").expect("url"));
        let provider = test_provider(page.clone(), background.port());

        let (log, listener) = recorder();
        provider.on("custom", listener);
        let queued = tokio::spawn({
            let provider = provider.clone();
            async move { provider.request(RequestEnvelope::new("eth_chainId")).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!provider.is_ready());
        assert!(!queued.is_finished());

        page.set_ready_state(ReadyState::Interactive);
        let result = tokio::time::timeout(Duration::from_secs(2), queued)
            .await
            .expect("queued call settles")
            .expect("task");
        assert_eq!(result, Ok(json!("0x1")));
        assert!(provider.is_ready());
        assert_eq!(provider.chain_id(), None);

        background.push("custom", json!(1));
        flush(&provider).await;
        assert_eq!(*log.lock(), vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_checkin_precedes_gated_requests() {
        let background = FakeBackground::new();
        let page = Page::new(
            PageMetadata::new("https://app.example.com/x")
                .expect("url")
                .with_title("Example"),
        );
        let provider = test_provider(page.clone(), background.port());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(background.methods().is_empty());

        page.set_ready_state(ReadyState::Interactive);
        provider.wait_ready().await;

        let requests = background.requests();
        assert_eq!(requests[0].method, methods::TAB_CHECKIN);
        assert_eq!(
            requests[0].params,
            Some(json!({ "icon": null, "name": "Example", "origin": "https://app.example.com" }))
        );
        assert_eq!(requests[1].method, methods::GET_PROVIDER_STATE);
    }

    #[tokio::test]
    async fn test_hidden_page_gates_new_requests() {
        let background = FakeBackground::new();
        background.set_reply("eth_blockNumber", Reply::Result(json!("0x10")));
        let page = loaded_page();
        let provider = test_provider(page.clone(), background.port());
        provider.wait_ready().await;

        page.set_visibility(Visibility::Hidden);
        tokio::task::yield_now().await;

        let pending = tokio::spawn({
            let provider = provider.clone();
            async move { provider.request(RequestEnvelope::new("eth_blockNumber")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!background.methods().contains(&"eth_blockNumber".to_string()));

        page.set_visibility(Visibility::Visible);
        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("admitted")
            .expect("task");
        assert_eq!(result, Ok(json!("0x10")));
    }

    #[tokio::test]
    async fn test_same_method_requests_share_one_execution() {
        let background = FakeBackground::new();
        background.set_reply("eth_getBalance", Reply::Defer);
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        let a = provider.request(RequestEnvelope::new("eth_getBalance"));
        let b = provider.request(RequestEnvelope::new("eth_getBalance"));
        let release = async {
            background.wait_for("eth_getBalance", 1).await;
            background.release("eth_getBalance", Reply::Result(json!("0x5")));
        };

        let (a, b, ()) = tokio::join!(a, b, release);
        assert_eq!(a, Ok(json!("0x5")));
        assert_eq!(b, Ok(json!("0x5")));
        assert_eq!(background.count("eth_getBalance"), 1);
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_pin_stale_result() {
        let background = FakeBackground::new();
        background.set_reply("eth_blockNumber", Reply::Defer);
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            provider.request(RequestEnvelope::new("eth_blockNumber")),
        )
        .await;
        assert!(abandoned.is_err());

        background.release("eth_blockNumber", Reply::Result(json!("0x1")));
        tokio::time::timeout(Duration::from_secs(2), async {
            while provider.inner.dedupe.is_in_flight("eth_blockNumber") {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("entry released");

        background.set_reply("eth_blockNumber", Reply::Result(json!("0x2")));
        let later = provider.request(RequestEnvelope::new("eth_blockNumber")).await;
        assert_eq!(later, Ok(json!("0x2")));
        assert_eq!(background.count("eth_blockNumber"), 2);
    }

    #[tokio::test]
    async fn test_notices_with_same_method_are_not_coalesced() {
        let background = FakeBackground::new();
        background.set_reply(methods::PROVIDER_REVOKED, Reply::Defer);
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        provider.notify(RequestEnvelope::new(methods::PROVIDER_REVOKED).with_params(json!(["io.a"])));
        provider.notify(RequestEnvelope::new(methods::PROVIDER_REVOKED).with_params(json!(["io.b"])));
        background.wait_for(methods::PROVIDER_REVOKED, 2).await;

        let params: Vec<_> = background
            .requests()
            .into_iter()
            .filter(|r| r.method == methods::PROVIDER_REVOKED)
            .map(|r| r.params)
            .collect();
        assert_eq!(params, vec![Some(json!(["io.a"])), Some(json!(["io.b"]))]);
    }

    #[tokio::test]
    async fn test_remote_error_is_normalized() {
        let background = FakeBackground::new();
        background.set_reply("eth_sendTransaction", Reply::Error(json!({ "code": 4001 })));
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        let err = provider
            .request(RequestEnvelope::new("eth_sendTransaction"))
            .await
            .expect_err("rejected");
        assert_eq!(err.code, codes::USER_REJECTED);
        assert_eq!(err.message, "User rejected the request.");
    }

    #[tokio::test]
    async fn test_falsy_payload_rejected_before_network() {
        let background = FakeBackground::new();
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;
        let sent = background.requests().len();

        for payload in [Value::Null, json!(false), json!({ "params": [] })] {
            let err = provider.request_value(payload).await.expect_err("invalid");
            assert_eq!(err.code, codes::INVALID_REQUEST);
        }
        assert_eq!(background.requests().len(), sent);
    }

    #[tokio::test]
    async fn test_channel_close_rejects_and_disconnects() {
        let background = FakeBackground::new();
        background.set_reply(methods::GET_PROVIDER_STATE, state_reply());
        background.set_reply("eth_sign", Reply::Defer);
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        let (log, listener) = recorder();
        provider.on(events::DISCONNECT, listener);

        let pending = tokio::spawn({
            let provider = provider.clone();
            async move { provider.request(RequestEnvelope::new("eth_sign")).await }
        });
        background.wait_for("eth_sign", 1).await;
        background.close();

        let err = pending.await.expect("task").expect_err("closed");
        assert_eq!(err.code, codes::DISCONNECTED);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !provider.state().is_permanently_disconnected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("disconnect observed");
        assert!(!provider.state().is_connected);
        assert_eq!(provider.selected_address(), None);
        assert_eq!(log.lock()[0]["code"], codes::DISCONNECTED);
    }

    #[tokio::test]
    async fn test_properties() {
        let background = FakeBackground::new();
        background.set_reply(methods::GET_PROVIDER_STATE, state_reply());
        let provider = test_provider(loaded_page(), background.port());
        provider.wait_ready().await;

        assert_eq!(provider.property("chainId"), Some(json!("0x1")));
        assert_eq!(provider.property(SELF_MARKER), Some(json!(true)));
        assert_eq!(provider.property("isMetaMask"), Some(json!(true)));
        assert_eq!(provider.property("unknown"), None);

        provider.set_property("chainId", json!("0x89"));
        assert_eq!(provider.property("chainId"), Some(json!("0x1")));

        provider.set_property("isMetaMask", json!(false));
        assert_eq!(provider.property("isMetaMask"), Some(json!(false)));
        provider.remove_property("isMetaMask");
        assert_eq!(provider.property("isMetaMask"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_remove_queued_listener() {
        let background = FakeBackground::new();
        let provider = test_provider(
            Page::new(PageMetadata::new("https://example.com").expect("url")),
            background.port(),
        );
        let (_, listener) = recorder();
        let id = provider.on("custom", listener);
        assert!(provider.remove_listener("custom", id));
        assert!(!provider.remove_listener("custom", id));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_queued_requests_and_listeners_flush_in_order(count in 1usize..12) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("runtime");

            runtime.block_on(async move {
                let background = FakeBackground::new();
                let page = Page::new(PageMetadata::new("https://example.com").expect("url"));
                let provider = test_provider(page.clone(), background.port());

                let order = Arc::new(Mutex::new(Vec::new()));
                let mut pending = Vec::new();
                for i in 0..count {
                    let log = Arc::clone(&order);
                    provider.on("tick", Arc::new(move |_| log.lock().push(i)));

                    // Polling once enqueues the request before the next one
                    let mut call = Box::pin(provider.request(RequestEnvelope::new(format!("m{i}"))));
                    assert!(futures_util::poll!(call.as_mut()).is_pending());
                    pending.push(call);
                }

                page.set_ready_state(ReadyState::Interactive);
                for call in pending {
                    assert_eq!(call.await, Ok(Value::Null));
                }

                let sent: Vec<String> = background
                    .methods()
                    .into_iter()
                    .filter(|m| m.starts_with('m'))
                    .collect();
                let expected: Vec<String> = (0..count).map(|i| format!("m{i}")).collect();
                assert_eq!(sent, expected);

                background.push("tick", Value::Null);
                flush(&provider).await;
                assert_eq!(*order.lock(), (0..count).collect::<Vec<_>>());
            });
        }
    }
}
