//! Cancellation context threaded through every handler.
//!
//! A [`Cx`] carries the cancellation state a handler must observe: an
//! explicit cancel flag with a first-cause slot, an inherited deadline,
//! and the plumbing that wakes blocked readers when either fires.
//! Cancellation is a protocol, not a silent stop:
//!
//! - [`Cx::cancel`] is idempotent; the first cause wins and later calls
//!   are no-ops, so a run-wide abort reason is never overwritten.
//! - Cancelling a context propagates the same cause to all live child
//!   contexts, and to children derived after the fact.
//! - Blocked waits (cell reads, [`Cx::sleep`]) register a waker with the
//!   context and are woken promptly; nothing polls.
//!
//! Deadlines are inherited: a child's effective deadline is the minimum
//! of its parent's and its own, so a tighter ancestor deadline is always
//! preserved.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, Weak};
use std::time::{Duration, Instant};

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Something a context can wake when it is cancelled.
///
/// Implementations must take the lock coupled to the condition they
/// signal, so a waiter between its flag check and its wait cannot miss
/// the wakeup.
pub(crate) trait CancelWaker: Send + Sync {
    /// Wakes the blocked waiter.
    fn wake(&self);
}

struct WaiterSlot {
    token: u64,
    waker: Weak<dyn CancelWaker>,
}

struct CxInner {
    cancelled: AtomicBool,
    /// First cancel cause; set before `cancelled` is raised.
    cause: OnceLock<Error>,
    deadline: Option<Instant>,
    waiters: Mutex<Vec<WaiterSlot>>,
    children: Mutex<Vec<Weak<CxInner>>>,
    next_token: AtomicU64,
}

impl CxInner {
    fn new(deadline: Option<Instant>) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            cause: OnceLock::new(),
            deadline,
            waiters: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        })
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn cancel(&self, cause: Error) {
        if self.cause.set(cause.clone()).is_err() {
            return;
        }
        self.cancelled.store(true, Ordering::Release);
        tracing::debug!(cause = %cause, "context cancelled");

        // Snapshot under the lock, wake outside it.
        let wakers: Vec<Arc<dyn CancelWaker>> = {
            let waiters = lock_or_recover(&self.waiters);
            waiters
                .iter()
                .filter_map(|slot| slot.waker.upgrade())
                .collect()
        };
        for waker in wakers {
            waker.wake();
        }

        let children: Vec<Arc<Self>> = {
            let mut children = lock_or_recover(&self.children);
            children.drain(..).filter_map(|w| w.upgrade()).collect()
        };
        for child in children {
            child.cancel(cause.clone());
        }
    }
}

/// A cancellation context.
///
/// Contexts form a tree: cancelling a parent cancels every descendant
/// with the same cause. Cloning a `Cx` yields another handle to the same
/// context.
#[derive(Clone)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Creates a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: CxInner::new(None),
        }
    }

    /// Derives a cancellable child context.
    ///
    /// The child inherits the parent's deadline and is cancelled with
    /// the parent's cause whenever the parent is cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        self.derive(None)
    }

    /// Derives a child context whose deadline is `timeout` from now.
    ///
    /// A tighter parent deadline is preserved.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.derive(Some(Instant::now() + timeout))
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let effective = match (self.inner.deadline, deadline) {
            (Some(inherited), Some(own)) => Some(inherited.min(own)),
            (inherited, own) => inherited.or(own),
        };
        let child = CxInner::new(effective);
        {
            let mut children = lock_or_recover(&self.inner.children);
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // The parent may have been cancelled concurrently with the
        // registration above; re-check so late children observe it.
        if self.inner.cancelled.load(Ordering::Acquire) {
            if let Some(cause) = self.inner.cause.get() {
                child.cancel(cause.clone());
            }
        }
        Self { inner: child }
    }

    /// Cancels this context (and all descendants) with the given cause.
    ///
    /// The first cause wins; later calls are no-ops. All blocked waits
    /// under this context return the cause as their error.
    pub fn cancel(&self, cause: Error) {
        self.inner.cancel(cause);
    }

    /// Returns true once this context is cancelled or its deadline has
    /// passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire) || self.inner.deadline_passed()
    }

    /// Returns the context's error, if any.
    ///
    /// A cancelled context reports its cancel cause; a context whose
    /// deadline has passed reports [`ErrorKind::DeadlineExceeded`]. An
    /// explicit cancellation takes precedence over the deadline.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Some(
                self.inner
                    .cause
                    .get()
                    .cloned()
                    .unwrap_or_else(|| Error::new(ErrorKind::Cancelled)),
            );
        }
        if self.inner.deadline_passed() {
            return Some(Error::new(ErrorKind::DeadlineExceeded));
        }
        None
    }

    /// Returns `Err` with the context's error if it is cancelled or past
    /// its deadline, else `Ok`.
    ///
    /// Long-running handlers call this at loop boundaries to observe
    /// cancellation promptly.
    ///
    /// # Errors
    ///
    /// The cancel cause, or a deadline-exceeded error.
    pub fn checkpoint(&self) -> Result<(), Error> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns the effective deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Sleeps for `duration`, waking early on cancellation or deadline
    /// expiry.
    ///
    /// This is the delay primitive handlers use instead of a bare thread
    /// sleep: a cancelled context interrupts the wait immediately.
    ///
    /// # Errors
    ///
    /// The context's error if it is cancelled or its deadline passes
    /// before the duration elapses.
    pub fn sleep(&self, duration: Duration) -> Result<(), Error> {
        self.checkpoint()?;
        let until = Instant::now() + duration;
        let parker = Arc::new(SleepParker {
            mutex: Mutex::new(()),
            cv: Condvar::new(),
        });
        let waker: Arc<dyn CancelWaker> = parker.clone();
        let _registration = self.register_waiter(Arc::downgrade(&waker));

        let mut guard = lock_or_recover(&parker.mutex);
        loop {
            if let Some(err) = self.error() {
                return Err(err);
            }
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            let wake_at = self.inner.deadline.map_or(until, |d| until.min(d));
            let wait_for = wake_at.saturating_duration_since(now);
            let (next, _timed_out) = parker
                .cv
                .wait_timeout(guard, wait_for)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard = next;
        }
    }

    /// Registers a waker to be woken on cancellation.
    ///
    /// The returned guard deregisters on drop. Callers register before
    /// taking the lock their waker signals under, so no wakeup is lost.
    pub(crate) fn register_waiter(&self, waker: Weak<dyn CancelWaker>) -> WaiterGuard {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let mut waiters = lock_or_recover(&self.inner.waiters);
        waiters.retain(|slot| slot.waker.strong_count() > 0);
        waiters.push(WaiterSlot { token, waker });
        WaiterGuard {
            inner: Arc::clone(&self.inner),
            token,
        }
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

/// Deregisters a waiter when dropped.
pub(crate) struct WaiterGuard {
    inner: Arc<CxInner>,
    token: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut waiters = lock_or_recover(&self.inner.waiters);
        if let Some(pos) = waiters.iter().position(|slot| slot.token == self.token) {
            waiters.swap_remove(pos);
        }
    }
}

struct SleepParker {
    mutex: Mutex<()>,
    cv: Condvar,
}

impl CancelWaker for SleepParker {
    fn wake(&self) {
        let _guard = lock_or_recover(&self.mutex);
        self.cv.notify_all();
    }
}
