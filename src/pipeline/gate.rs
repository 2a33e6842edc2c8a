//! Multi-slot readiness gate.
//!
//! A [`ReadyGate`] withholds calls until all of its `N` check-slots are
//! satisfied. Calls submitted while the gate is closed are admitted later,
//! in submission order, the moment the last missing slot is checked.
//! Unchecking a slot closes the gate for new calls only; admitted calls keep
//! running.
//!
//! # Example
//!
//! ```ignore
//! let gate = ReadyGate::new(2);
//! let pending = gate.call(|| async { 42 });
//! gate.check(1);
//! gate.check(2); // `pending` is admitted here
//! assert_eq!(pending.await?, 42);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Deferred invocation of a queued thunk.
type Admission = Box<dyn FnOnce() + Send>;

/// Gate bookkeeping.
struct GateState {
    /// Satisfied flag per slot; index 0 is slot 1.
    slots: Vec<bool>,
    /// Calls waiting for the gate to open, in submission order.
    queue: VecDeque<Admission>,
    /// Set while queued calls are being admitted.
    draining: bool,
}

impl GateState {
    fn is_open(&self) -> bool {
        self.slots.iter().all(|checked| *checked)
    }
}

// ============================================================================
// ReadyGate
// ============================================================================

/// Barrier over a fixed number of independently toggled preconditions.
#[derive(Clone)]
pub struct ReadyGate {
    state: Arc<Mutex<GateState>>,
}

impl fmt::Debug for ReadyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReadyGate")
            .field("slots", &state.slots)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl ReadyGate {
    /// Creates a gate with `target` slots, all unsatisfied.
    ///
    /// A gate with zero slots is always open.
    #[must_use]
    pub fn new(target: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                slots: vec![false; target],
                queue: VecDeque::new(),
                draining: false,
            })),
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn target(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Returns `true` if every slot is satisfied.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().is_open()
    }

    /// Returns `true` if `slot` (1-based) is satisfied.
    #[must_use]
    pub fn is_checked(&self, slot: usize) -> bool {
        let state = self.state.lock();
        slot.checked_sub(1)
            .and_then(|i| state.slots.get(i).copied())
            .unwrap_or(false)
    }

    /// Number of calls waiting for admission.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Marks `slot` (1-based) satisfied.
    ///
    /// If this opens the gate, every queued call is admitted in submission
    /// order before this method returns. Out-of-range slots are ignored.
    pub fn check(&self, slot: usize) {
        let mut state = self.state.lock();

        let Some(flag) = slot.checked_sub(1).and_then(|i| state.slots.get_mut(i)) else {
            warn!(slot, "Ignoring check of unknown gate slot");
            return;
        };
        *flag = true;
        trace!(slot, "Gate slot checked");

        if !state.is_open() || state.draining {
            return;
        }

        state.draining = true;
        loop {
            let batch: Vec<Admission> = state.queue.drain(..).collect();
            if batch.is_empty() {
                break;
            }

            debug!(count = batch.len(), "Gate open, admitting queued calls");
            drop(state);
            for admit in batch {
                admit();
            }
            state = self.state.lock();

            if !state.is_open() {
                break;
            }
        }
        state.draining = false;
    }

    /// Marks `slot` (1-based) unsatisfied. Out-of-range slots are ignored.
    pub fn uncheck(&self, slot: usize) {
        let mut state = self.state.lock();
        match slot.checked_sub(1).and_then(|i| state.slots.get_mut(i)) {
            Some(flag) => {
                *flag = false;
                trace!(slot, "Gate slot unchecked");
            }
            None => warn!(slot, "Ignoring uncheck of unknown gate slot"),
        }
    }

    /// Invokes `thunk` once the gate is open.
    ///
    /// When the gate is already open (and no earlier calls are still being
    /// admitted) `thunk` runs synchronously inside this call. Otherwise it is
    /// queued and runs inside the [`check`](Self::check) that opens the gate.
    /// The returned future resolves with the thunk's future output.
    ///
    /// # Errors
    ///
    /// The future yields [`Error::GateClosed`] if the gate is dropped with
    /// the call still queued.
    pub fn call<F, Fut>(&self, thunk: F) -> BoxFuture<'static, Result<Fut::Output>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let mut state = self.state.lock();

        if state.is_open() && !state.draining {
            drop(state);
            let fut = thunk();
            return async move { Ok(fut.await) }.boxed();
        }

        let (tx, rx) = oneshot::channel::<Fut>();
        state.queue.push_back(Box::new(move || {
            let _ = tx.send(thunk());
        }));
        trace!(queued = state.queue.len(), "Gate closed, call queued");
        drop(state);

        async move {
            let fut = rx.await.map_err(|_| Error::GateClosed)?;
            Ok(fut.await)
        }
        .boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
