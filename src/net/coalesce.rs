//! In-flight request coalescing.
//!
//! DESIGN
//! ======
//! The first caller for a signature spawns the work as a runtime task and
//! records a shared handle to its outcome. Every caller that arrives before
//! the task settles awaits that same handle, so the work runs once and all
//! callers observe one value. The entry is inserted under the map lock and
//! the task is spawned only after the lock is released, so neither `perform`
//! nor a runtime that drops the task on spawn can re-enter a held lock. The
//! task owns an `EntryCleanup` guard which removes the map entry when the
//! task future is dropped: on success, error, timeout, abort, panic, or a
//! refused spawn. The task drops the guard before publishing its result, so
//! the entry is gone before any caller is resumed.
//!
//! TRADE-OFFS
//! ==========
//! Spawning means the request keeps running when the caller that started it
//! is dropped; the remaining joiners still need the answer. It also means the
//! work must be `Send + 'static`. The map lock is a `std::sync::Mutex` held
//! only around map operations, never across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{AbortHandle, AbortRegistration, Abortable, BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use super::types::ApiError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

type SharedOutcome<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

// =============================================================================
// STATUS
// =============================================================================

/// Snapshot of the entries currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescerStatus<K> {
    pub pending: usize,
    pub keys: Vec<K>,
}

/// Counters for monitoring how often callers were merged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Calls to `execute`.
    pub total: u64,
    /// Calls that joined an existing entry.
    pub coalesced: u64,
    /// Calls that started new work.
    pub started: u64,
}

impl CoalescerStats {
    /// Fraction of calls that joined instead of starting work.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.coalesced as f64 / self.total as f64 }
    }
}

// =============================================================================
// COALESCER
// =============================================================================

struct Pending<V> {
    id: u64,
    outcome: SharedOutcome<V>,
    abort: AbortHandle,
}

struct CoalescerInner<K, V> {
    pending: HashMap<K, Pending<V>>,
    next_id: u64,
    stats: CoalescerStats,
}

/// Deduplicates concurrent calls that share a key.
///
/// Cloning is cheap and every clone shares the same pending map.
pub struct RequestCoalescer<K, V> {
    inner: Arc<Mutex<CoalescerInner<K, V>>>,
    timeout: Duration,
}

impl<K, V> Clone for RequestCoalescer<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), timeout: self.timeout }
    }
}

impl<K, V> RequestCoalescer<K, V>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CoalescerInner {
                pending: HashMap::new(),
                next_id: 0,
                stats: CoalescerStats::default(),
            })),
            timeout,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `perform` unless an identical call is already in flight.
    ///
    /// Late callers receive the in-flight call's result; their own `perform`
    /// is never invoked. `perform` and the task spawn both run after the map
    /// lock is released.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the shared call, `ApiError::Timeout` when
    /// it exceeds the configured bound, or `ApiError::Cancelled` when it was
    /// aborted through [`RequestCoalescer::cancel_all`] or the runtime dropped
    /// it unstarted.
    pub async fn execute<F, Fut>(&self, key: K, perform: F) -> Result<V, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let (outcome, start) = {
            let mut inner = self.lock();
            inner.stats.total += 1;
            if let Some(outcome) = inner.pending.get(&key).map(|p| p.outcome.clone()) {
                inner.stats.coalesced += 1;
                debug!(%key, "coalescer: joining in-flight request");
                (outcome, None)
            } else {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.stats.started += 1;
                debug!(%key, id, "coalescer: starting request");
                let (outcome, start) = Start::new(id, key.clone(), Arc::downgrade(&self.inner));
                inner.pending.insert(
                    key,
                    Pending { id, outcome: outcome.clone(), abort: start.abort.clone() },
                );
                (outcome, Some(start))
            }
        };
        if let Some(start) = start {
            start.spawn(self.timeout, perform());
        }
        outcome.await
    }

    /// Abort every in-flight call. Joined callers receive `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(K, Pending<V>)> = self.lock().pending.drain().collect();
        for (key, pending) in &drained {
            debug!(%key, id = pending.id, "coalescer: cancelling request");
            pending.abort.abort();
        }
        drained.len()
    }

    /// Forget all entries without aborting them.
    ///
    /// Callers already joined still receive their result; the next call with
    /// a forgotten key starts fresh work.
    pub fn clear(&self) {
        let mut inner = self.lock();
        debug!(pending = inner.pending.len(), "coalescer: clearing pending entries");
        inner.pending.clear();
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    #[must_use]
    pub fn status(&self) -> CoalescerStatus<K> {
        let inner = self.lock();
        CoalescerStatus { pending: inner.pending.len(), keys: inner.pending.keys().cloned().collect() }
    }

    #[must_use]
    pub fn stats(&self) -> CoalescerStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, CoalescerInner<K, V>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for RequestCoalescer<K, V>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

// =============================================================================
// START
// =============================================================================

/// Everything the starting caller needs to launch the work once the map lock
/// is released. The entry is already visible to joiners at this point.
struct Start<K: Hash + Eq, V> {
    cleanup: EntryCleanup<K, V>,
    abort: AbortHandle,
    registration: AbortRegistration,
    settle: oneshot::Sender<Result<V, ApiError>>,
}

impl<K, V> Start<K, V>
where
    K: Hash + Eq + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(id: u64, key: K, inner: Weak<Mutex<CoalescerInner<K, V>>>) -> (SharedOutcome<V>, Self) {
        let (settle, settled) = oneshot::channel();
        let (abort, registration) = AbortHandle::new_pair();
        let outcome = async move {
            // A dropped sender means the task never ran to completion.
            settled.await.unwrap_or(Err(ApiError::Cancelled))
        }
        .boxed()
        .shared();
        let cleanup = EntryCleanup { inner, key, id };
        (outcome, Self { cleanup, abort, registration, settle })
    }

    /// Must not be called with the map lock held: if the runtime refuses the
    /// task, its cleanup runs synchronously and takes that lock.
    fn spawn<Fut>(self, timeout: Duration, work: Fut)
    where
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let Self { cleanup, registration, settle, .. } = self;
        tokio::spawn(async move {
            let cleanup = cleanup;
            let timed = tokio::time::timeout(timeout, work);
            let result = match Abortable::new(AssertUnwindSafe(timed).catch_unwind(), registration).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(_elapsed))) => {
                    warn!(key = %cleanup.key, timeout_ms = duration_ms(timeout), "coalescer: request timed out");
                    Err(ApiError::Timeout { after_ms: duration_ms(timeout) })
                }
                Ok(Err(panic)) => Err(ApiError::Internal(panic_message(panic.as_ref()))),
                Err(_aborted) => Err(ApiError::Cancelled),
            };
            // Entry goes before any caller resumes.
            drop(cleanup);
            let _ = settle.send(result);
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "request task panicked".to_owned())
}

// =============================================================================
// CLEANUP
// =============================================================================

/// Removes the entry that spawned it, and only that entry.
struct EntryCleanup<K: Hash + Eq, V> {
    inner: Weak<Mutex<CoalescerInner<K, V>>>,
    key: K,
    id: u64,
}

impl<K: Hash + Eq, V> Drop for EntryCleanup<K, V> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.pending.get(&self.key).is_some_and(|p| p.id == self.id) {
            inner.pending.remove(&self.key);
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "coalesce_test.rs"]
mod tests;
