//! Coalescing of concurrent calls sharing a key.
//!
//! While a call for a key is in flight, further calls for the same key get
//! the in-flight call's shared future instead of starting a new one. The
//! entry is removed when the underlying call settles, success or failure,
//! even if every waiter has dropped its future.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// A call whose outcome is shared by every waiter.
pub type SharedCall<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// One live entry.
struct Entry<T, E> {
    /// Distinguishes this entry from a later one under the same key.
    generation: u64,
    call: SharedCall<T, E>,
}

/// Key → in-flight call.
struct DedupeTable<T, E> {
    entries: FxHashMap<String, Entry<T, E>>,
    next_generation: u64,
}

// ============================================================================
// DedupeRouter
// ============================================================================

/// Collapses concurrent calls that share a key.
pub struct DedupeRouter<T, E> {
    table: Arc<Mutex<DedupeTable<T, E>>>,
}

impl<T, E> Clone for DedupeRouter<T, E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T, E> Default for DedupeRouter<T, E> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(DedupeTable {
                entries: FxHashMap::default(),
                next_generation: 0,
            })),
        }
    }
}

impl<T, E> fmt::Debug for DedupeRouter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("DedupeRouter")
            .field("in_flight", &table.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T, E> DedupeRouter<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `thunk` for `key` unless a call for `key` is already in flight,
    /// in which case the in-flight call is returned and `thunk` is dropped.
    ///
    /// `thunk` runs synchronously inside this call and must not call back
    /// into the same router. Inside a Tokio runtime the call is driven to
    /// completion by a background task, so the entry is released on settle
    /// whether or not anyone still awaits it.
    pub fn call<F, Fut>(&self, key: &str, thunk: F) -> SharedCall<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut table = self.table.lock();

        if let Some(entry) = table.entries.get(key) {
            trace!(key, "Joining in-flight call");
            return entry.call.clone();
        }

        let generation = table.next_generation;
        table.next_generation += 1;

        let fut = thunk();
        let release: Weak<Mutex<DedupeTable<T, E>>> = Arc::downgrade(&self.table);
        let owned_key = key.to_string();

        let call = async move {
            let outcome = fut.await;
            if let Some(table) = release.upgrade() {
                let mut table = table.lock();
                if table
                    .entries
                    .get(&owned_key)
                    .is_some_and(|entry| entry.generation == generation)
                {
                    table.entries.remove(&owned_key);
                }
            }
            outcome
        }
        .boxed()
        .shared();

        table.entries.insert(
            key.to_string(),
            Entry {
                generation,
                call: call.clone(),
            },
        );
        drop(table);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(call.clone().map(|_| ()));
        }
        call
    }

    /// Returns `true` if a call for `key` is in flight.
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.table.lock().entries.contains_key(key)
    }

    /// Number of keys with a call in flight.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.table.lock().entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
