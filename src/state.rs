//! Single-assignment result cell.
//!
//! A [`State`] decouples one writer (the handler owning the id) from any
//! number of readers (its peers). Readers block until the cell settles
//! or their context is cancelled; once settled, every past and future
//! read observes the exact pair that was written.

use crate::cx::{lock_or_recover, CancelWaker, Cx};
use crate::error::Error;
use crate::handler::Value;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

#[derive(Clone)]
struct Settled {
    value: Option<Value>,
    error: Option<Error>,
}

struct StateInner {
    slot: Mutex<Option<Settled>>,
    cv: Condvar,
}

impl CancelWaker for StateInner {
    fn wake(&self) {
        // Take the slot lock so a reader between its checks and its wait
        // cannot miss this notification.
        let _guard = lock_or_recover(&self.slot);
        self.cv.notify_all();
    }
}

/// A single-assignment cell holding one handler's `(value, error)` pair.
///
/// Constructed empty, written exactly once, readable forever after.
pub struct State {
    inner: Arc<StateInner>,
}

impl State {
    /// Creates an empty, unsettled cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StateInner {
                slot: Mutex::new(None),
                cv: Condvar::new(),
            }),
        }
    }

    /// Reads the cell, blocking until it settles or `cx` is cancelled.
    ///
    /// A settled cell returns its pair immediately and idempotently; a
    /// settled cell wins over a simultaneously cancelled context. On
    /// cancellation (or deadline expiry) the context's error is returned
    /// and the cell stays unsettled, so readers under other contexts
    /// keep waiting.
    #[must_use]
    pub fn read(&self, cx: &Cx) -> (Option<Value>, Option<Error>) {
        let waker: Arc<dyn CancelWaker> = self.inner.clone();
        let _registration = cx.register_waiter(Arc::downgrade(&waker));

        let mut slot = lock_or_recover(&self.inner.slot);
        loop {
            if let Some(settled) = slot.as_ref() {
                return (settled.value.clone(), settled.error.clone());
            }
            if let Some(err) = cx.error() {
                return (None, Some(err));
            }
            slot = match cx.deadline() {
                Some(deadline) => {
                    let wait_for = deadline.saturating_duration_since(Instant::now());
                    self.inner
                        .cv
                        .wait_timeout(slot, wait_for)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .cv
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Settles the cell and wakes all blocked readers.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already settled. A second write is a
    /// programming error, not a recoverable condition.
    pub fn write(&self, value: Option<Value>, error: Option<Error>) {
        let mut slot = lock_or_recover(&self.inner.slot);
        assert!(
            slot.is_none(),
            "single-assignment cell written twice"
        );
        *slot = Some(Settled { value, error });
        self.inner.cv.notify_all();
    }

    /// Returns true once the cell has been written.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        lock_or_recover(&self.inner.slot).is_some()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("settled", &self.is_settled())
            .finish()
    }
}
