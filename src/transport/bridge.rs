//! Message bridge to the privileged context.
//!
//! This module turns a [`RequestEnvelope`] into a correlated response over a
//! [`Port`], and routes uncorrelated inbound messages to a push handler.
//!
//! # Event Loop
//!
//! [`Bridge::connect`] spawns a tokio task that handles:
//!
//! - Incoming frames from the privileged context (responses, push events)
//! - Outgoing requests from the provider
//! - Request/response correlation by UUID
//! - Failing every pending request when the channel goes away

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{PushEvent, Request, RequestEnvelope, Response};

use super::port::{Port, PortSender};

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Value>>>;

/// Push event handler callback type.
///
/// Called, one event at a time, for every inbound message that is not a
/// response to a pending request.
pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

/// Called once when the underlying channel closes.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Channel halves waiting for [`Bridge::connect`].
type Unstarted = (Port, mpsc::UnboundedReceiver<BridgeCommand>);

// ============================================================================
// BridgeCommand
// ============================================================================

/// Internal commands for the event loop.
enum BridgeCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Shutdown the bridge.
    Shutdown,
}

// ============================================================================
// Bridge
// ============================================================================

/// Point-to-point asynchronous channel to the privileged context.
///
/// Requests submitted before [`connect`](Self::connect) are buffered and sent
/// once the event loop starts.
///
/// # Thread Safety
///
/// `Bridge` is `Send + Sync` and cheap to clone; clones share one channel.
#[derive(Clone)]
pub struct Bridge {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Push handler (shared with event loop).
    push_handler: Arc<Mutex<Option<PushHandler>>>,
    /// Close handler (shared with event loop).
    close_handler: Arc<Mutex<Option<CloseHandler>>>,
    /// Port and command receiver until the loop is spawned.
    unstarted: Arc<Mutex<Option<Unstarted>>>,
    /// Set once the loop has terminated.
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a bridge over the page end of a port.
    ///
    /// Nothing is sent or received until [`connect`](Self::connect).
    #[must_use]
    pub fn new(port: Port) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            command_tx,
            correlation: Arc::new(Mutex::new(CorrelationMap::default())),
            push_handler: Arc::new(Mutex::new(None)),
            close_handler: Arc::new(Mutex::new(None)),
            unstarted: Arc::new(Mutex::new(Some((port, command_rx)))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the event loop. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> &Self {
        let Some((port, command_rx)) = self.unstarted.lock().take() else {
            return self;
        };

        tokio::spawn(Self::run_event_loop(
            port,
            command_rx,
            Arc::clone(&self.correlation),
            Arc::clone(&self.push_handler),
            Arc::clone(&self.close_handler),
            Arc::clone(&self.closed),
        ));

        debug!("Bridge connected");
        self
    }

    /// Sets the push event handler.
    pub fn set_push_handler(&self, handler: PushHandler) {
        *self.push_handler.lock() = Some(handler);
    }

    /// Sets the close handler.
    pub fn set_close_handler(&self, handler: CloseHandler) {
        *self.close_handler.lock() = Some(handler);
    }

    /// Sends an envelope and resolves with the remote result.
    ///
    /// The request is queued for sending synchronously, so two calls made
    /// one after the other reach the privileged context in that order. The
    /// returned future only waits for the response.
    ///
    /// # Errors
    ///
    /// - [`Error::Rpc`] if the privileged context reports a failure
    /// - [`Error::ConnectionClosed`] if the channel is or becomes closed
    /// - [`Error::Json`] if the envelope cannot be serialized
    pub fn request(
        &self,
        envelope: RequestEnvelope,
    ) -> impl Future<Output = Result<Value>> + Send + 'static + use<> {
        let (response_tx, response_rx) = oneshot::channel();
        let request = Request::new(envelope);

        let queued = self
            .command_tx
            .send(BridgeCommand::Send {
                request,
                response_tx,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(Error::ConnectionClosed);
            }
            match response_rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::ConnectionClosed),
            }
        }
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Returns `true` once the event loop has been started.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.unstarted.lock().is_none()
    }

    /// Returns `true` once the channel has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shuts the bridge down; pending requests fail with `ConnectionClosed`.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(BridgeCommand::Shutdown);
    }

    /// Event loop that handles port I/O.
    async fn run_event_loop(
        port: Port,
        mut command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        push_handler: Arc<Mutex<Option<PushHandler>>>,
        close_handler: Arc<Mutex<Option<CloseHandler>>>,
        closed: Arc<AtomicBool>,
    ) {
        let (port_tx, mut port_rx) = port.into_split();

        loop {
            tokio::select! {
                // Incoming frames from the privileged context
                frame = port_rx.recv() => {
                    match frame {
                        Some(text) => {
                            Self::handle_incoming_message(&text, &correlation, &push_handler);
                        }
                        None => {
                            debug!("Port closed by remote");
                            break;
                        }
                    }
                }

                // Requests from the provider
                command = command_rx.recv() => {
                    match command {
                        Some(BridgeCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(request, response_tx, &port_tx, &correlation);
                        }

                        Some(BridgeCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        closed.store(true, Ordering::Release);
        command_rx.close();

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        // Requests queued but never sent
        while let Ok(command) = command_rx.try_recv() {
            if let BridgeCommand::Send { response_tx, .. } = command {
                let _ = response_tx.send(Err(Error::ConnectionClosed));
            }
        }

        let handler = close_handler.lock().clone();
        if let Some(handler) = handler {
            handler();
        }

        debug!("Bridge event loop terminated");
    }

    /// Handles an incoming text frame.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        push_handler: &Arc<Mutex<Option<PushHandler>>>,
    ) {
        // Try to parse as Response first
        if let Ok(response) = from_str::<Response>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(response.into_result());
            } else {
                warn!(id = %response.id, "Response for unknown request");
            }

            return;
        }

        // Try to parse as push event
        if let Ok(event) = from_str::<PushEvent>(text) {
            let handler = push_handler.lock().clone();
            match handler {
                Some(handler) => handler(event),
                None => trace!(event = %event.event, "Push event before handler attached"),
            }
            return;
        }

        warn!(text = %text, "Failed to parse incoming message");
    }

    /// Handles a send command.
    fn handle_send_command(
        request: Request,
        response_tx: oneshot::Sender<Result<Value>>,
        port_tx: &PortSender,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let request_id = request.id;

        // Serialize request
        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = port_tx.send(json) {
            if let Some(tx) = correlation.lock().remove(&request_id) {
                let _ = tx.send(Err(e));
            }
            return;
        }

        trace!(%request_id, method = %request.data.method, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
