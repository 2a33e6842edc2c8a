//! Shared test doubles: an in-memory privileged context and a stub provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::discovery::ProviderInfo;
use crate::error::{RpcError, RpcResult};
use crate::identifiers::ListenerId;
use crate::page::{Page, PageMetadata, ReadyState, Visibility};
use crate::protocol::RequestEnvelope;
use crate::provider::{EventEmitter, Listener, Provider, WalletProvider};
use crate::transport::{Port, PortSender};

// ============================================================================
// Fixtures
// ============================================================================

/// Smallest valid announcement icon (`<svg/>`).
pub(crate) const TEST_ICON: &str = "data:image/svg+xml;base64,PHN2Zy8+";

/// Method used by [`flush`] to round-trip the channel.
const FLUSH_METHOD: &str = "test_flush";

pub(crate) fn test_info(rdns: &str) -> ProviderInfo {
    ProviderInfo::new("Test Wallet", TEST_ICON, rdns)
}

/// A visible page whose DOM is ready.
pub(crate) fn loaded_page() -> Page {
    let metadata = PageMetadata::new("https://app.example.com").expect("url");
    Page::with_state(metadata, Visibility::Visible, ReadyState::Interactive)
}

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a provider with default settings. Must run inside a runtime.
pub(crate) fn test_provider(page: Page, port: Port) -> Provider {
    init_tracing();
    Provider::builder()
        .info(test_info("io.example.wallet"))
        .build(page, port)
        .expect("provider")
}

/// A listener that appends every payload to the returned log.
pub(crate) fn recorder() -> (Arc<Mutex<Vec<Value>>>, Listener) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, Arc::new(move |data: &Value| sink.lock().push(data.clone())))
}

/// Waits until every frame pushed before this call has been handled.
///
/// Push frames and responses share one ordered channel, so once a later
/// response arrives the earlier pushes have been dispatched.
pub(crate) async fn flush(provider: &Provider) {
    let _ = provider.request(RequestEnvelope::new(FLUSH_METHOD)).await;
}

// ============================================================================
// FakeBackground
// ============================================================================

/// How the fake privileged context answers a method.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Result(Value),
    Error(Value),
    /// Hold the request until [`FakeBackground::release`].
    Defer,
}

struct Shared {
    replies: Mutex<FxHashMap<String, Reply>>,
    deferred: Mutex<FxHashMap<String, Vec<Value>>>,
    log: watch::Sender<Vec<RequestEnvelope>>,
    sender: Mutex<Option<PortSender>>,
}

impl Shared {
    fn answer(&self, id: &Value, reply: Reply) {
        let frame = match reply {
            Reply::Result(result) => json!({ "id": id, "type": "success", "result": result }),
            Reply::Error(error) => json!({ "id": id, "type": "error", "error": error }),
            Reply::Defer => return,
        };
        self.send(frame);
    }

    fn send(&self, frame: Value) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(frame.to_string());
        }
    }

    fn handle(&self, frame: &str) {
        let Ok(message) = serde_json::from_str::<Value>(frame) else {
            return;
        };
        let Ok(envelope) = serde_json::from_value::<RequestEnvelope>(message["data"].clone()) else {
            return;
        };
        let id = message["id"].clone();
        let method = envelope.method.clone();
        self.log.send_modify(|log| log.push(envelope));

        let reply = self
            .replies
            .lock()
            .get(&method)
            .cloned()
            .unwrap_or(Reply::Result(Value::Null));
        match reply {
            Reply::Defer => self.deferred.lock().entry(method).or_default().push(id),
            reply => self.answer(&id, reply),
        }
    }
}

/// In-memory privileged context.
///
/// Records every request, answers per method (success `null` by default),
/// and can push events or close the channel.
pub(crate) struct FakeBackground {
    shared: Arc<Shared>,
    page_port: Mutex<Option<Port>>,
    task: JoinHandle<()>,
}

impl fmt::Debug for FakeBackground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeBackground")
            .field("requests", &self.methods())
            .finish_non_exhaustive()
    }
}

impl FakeBackground {
    /// Must run inside a runtime.
    pub(crate) fn new() -> Self {
        let (page, background) = Port::pair();
        let (sender, rx) = background.into_split();
        let (log, _) = watch::channel(Vec::new());

        let shared = Arc::new(Shared {
            replies: Mutex::new(FxHashMap::default()),
            deferred: Mutex::new(FxHashMap::default()),
            log,
            sender: Mutex::new(Some(sender)),
        });

        let task = tokio::spawn(serve(Arc::clone(&shared), rx));

        Self {
            shared,
            page_port: Mutex::new(Some(page)),
            task,
        }
    }

    /// The page end of the channel. Can be taken once.
    pub(crate) fn port(&self) -> Port {
        self.page_port.lock().take().expect("page port already taken")
    }

    pub(crate) fn set_reply(&self, method: &str, reply: Reply) {
        self.shared.replies.lock().insert(method.to_string(), reply);
    }

    /// Answers every deferred request for `method` and stops deferring it.
    pub(crate) fn release(&self, method: &str, reply: Reply) {
        self.set_reply(method, reply.clone());
        let held = self.shared.deferred.lock().remove(method).unwrap_or_default();
        for id in held {
            self.shared.answer(&id, reply.clone());
        }
    }

    pub(crate) fn push(&self, event: &str, data: Value) {
        self.shared.send(json!({ "type": "event", "event": event, "data": data }));
    }

    pub(crate) fn requests(&self) -> Vec<RequestEnvelope> {
        self.shared.log.borrow().clone()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.method).collect()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.shared.log.borrow().iter().filter(|r| r.method == method).count()
    }

    /// Resolves once `method` has been received `n` times.
    pub(crate) async fn wait_for(&self, method: &str, n: usize) {
        let mut rx = self.shared.log.subscribe();
        let _ = rx
            .wait_for(|log| log.iter().filter(|r| r.method == method).count() >= n)
            .await;
    }

    /// Drops the channel as if the privileged context went away.
    pub(crate) fn close(&self) {
        self.shared.sender.lock().take();
        self.shared.deferred.lock().clear();
        self.task.abort();
    }
}

impl Drop for FakeBackground {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = rx.recv().await {
        shared.handle(&frame);
    }
}

// ============================================================================
// StubProvider
// ============================================================================

/// A foreign provider that answers every request with a fixed result.
pub(crate) struct StubProvider {
    name: String,
    result: Mutex<RpcResult<Value>>,
    requests: Mutex<Vec<RequestEnvelope>>,
    emitter: EventEmitter,
    properties: Mutex<FxHashMap<String, Value>>,
}

impl fmt::Debug for StubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubProvider").field("name", &self.name).finish_non_exhaustive()
    }
}

impl StubProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: Mutex::new(Ok(json!(name))),
            requests: Mutex::new(Vec::new()),
            emitter: EventEmitter::new(0),
            properties: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn set_result(&self, result: RpcResult<Value>) {
        *self.result.lock() = result;
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.method.clone()).collect()
    }

    pub(crate) fn emit(&self, event: &str, data: &Value) -> bool {
        self.emitter.emit(event, data)
    }
}

#[async_trait]
impl WalletProvider for StubProvider {
    async fn request(&self, envelope: RequestEnvelope) -> RpcResult<Value> {
        self.requests.lock().push(envelope);
        self.result.lock().clone()
    }

    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.emitter.on(event, listener)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        self.emitter.remove_listener(event, id)
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.properties.lock().get(name).cloned()
    }

    fn set_property(&self, name: &str, value: Value) {
        self.properties.lock().insert(name.to_string(), value);
    }
}

/// A foreign provider error, as a delegate would report it.
pub(crate) fn rejected() -> RpcError {
    RpcError::new(crate::error::codes::USER_REJECTED, "User rejected the request.")
}
