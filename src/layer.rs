//! Composable handler middleware.
//!
//! A [`Layer`] transforms a handler into another handler. Layers are
//! applied right-to-left at registration, so the first listed layer is
//! the outermost: it runs its pre-work first and sees the result last.
//! Cross-cutting concerns therefore read top-down in declaration order.

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::handler::{fail, Handler};
use crate::store::{HandlerId, Store};
use std::sync::Arc;
use std::time::Duration;

/// A handler transformation applied at registration.
pub type Layer = Box<dyn FnOnce(Handler) -> Handler>;

/// Composes `layers` around `handler`, first listed outermost.
pub(crate) fn wrap(handler: Handler, layers: Vec<Layer>) -> Handler {
    layers
        .into_iter()
        .rev()
        .fold(handler, |inner, layer| layer(inner))
}

/// Runs the inner handler under a child context that expires after
/// `duration`.
///
/// The inner handler observes the expiry through its context; blocked
/// reads and sleeps return a [`ErrorKind::DeadlineExceeded`] error.
#[must_use]
pub fn timeout(duration: Duration) -> Layer {
    Box::new(move |next| {
        let wrapped: Handler = Arc::new(move |cx: &Cx, store: &Store| {
            let scoped = cx.child_with_timeout(duration);
            next(&scoped, store)
        });
        wrapped
    })
}

/// Skips the inner handler entirely when `skip` is true, settling its
/// cell with a [`ErrorKind::Skipped`] error.
#[must_use]
pub fn condition(skip: bool) -> Layer {
    Box::new(move |next| {
        let wrapped: Handler = Arc::new(move |cx: &Cx, store: &Store| {
            if skip {
                return fail(Error::new(ErrorKind::Skipped));
            }
            next(cx, store)
        });
        wrapped
    })
}

/// Marks the handler as critical: any inner error is joined with
/// [`ErrorKind::CriticalPath`], which makes the executor cancel the
/// remaining work and surface the failure from `run`.
///
/// Both the critical-path marker and the inner error stay matchable
/// through [`Error::has_kind`].
#[must_use]
pub fn critical_path() -> Layer {
    Box::new(|next| {
        let wrapped: Handler = Arc::new(move |cx: &Cx, store: &Store| {
            let (value, error) = next(cx, store);
            match error {
                Some(err) => (value, Some(Error::new(ErrorKind::CriticalPath).also(err))),
                None => (value, None),
            }
        });
        wrapped
    })
}

/// Delays the inner handler until every listed peer has completed.
///
/// Sequencing means "after completion", not "after success": peer result
/// errors are ignored. Context cancellation or deadline expiry during
/// the wait aborts with the context's error; an unregistered peer aborts
/// with [`ErrorKind::StateNotRegistered`].
#[must_use]
pub fn run_after<I>(peers: I) -> Layer
where
    I: IntoIterator,
    I::Item: Into<HandlerId>,
{
    let peers: Vec<HandlerId> = peers.into_iter().map(Into::into).collect();
    Box::new(move |next| {
        let wrapped: Handler = Arc::new(move |cx: &Cx, store: &Store| {
            for &peer in &peers {
                let (_, error) = store.read(cx, peer);
                if let Some(err) = cx.error() {
                    return fail(err);
                }
                match error {
                    Some(err) if err.has_kind(ErrorKind::StateNotRegistered) => {
                        return fail(err);
                    }
                    _ => {}
                }
            }
            next(cx, store)
        });
        wrapped
    })
}
