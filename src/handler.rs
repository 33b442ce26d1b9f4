//! Handler shape and result helpers.
//!
//! A handler is any `Fn(&Cx, &Store) -> HandlerResult` closure. Results
//! are type-erased: a value is an `Arc<dyn Any>`, cloned cheaply into
//! every reader. A result may carry a value, an error, both (a partial
//! result plus the reason it is partial), or neither ("completed with no
//! data").

use crate::cx::Cx;
use crate::error::Error;
use crate::store::Store;
use std::any::Any;
use std::sync::Arc;

/// A type-erased, shareable handler result value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// The `(value, error)` pair a handler produces.
pub type HandlerResult = (Option<Value>, Option<Error>);

/// A registered computation.
///
/// Handlers receive the run's cancellation context and the shared store,
/// through which they may block on peer results.
pub type Handler = Arc<dyn Fn(&Cx, &Store) -> HandlerResult + Send + Sync>;

/// Wraps a successful value into a [`HandlerResult`].
#[must_use]
pub fn done<T: Any + Send + Sync>(value: T) -> HandlerResult {
    (Some(Arc::new(value)), None)
}

/// Wraps an error into a [`HandlerResult`].
#[must_use]
pub fn fail(error: Error) -> HandlerResult {
    (None, Some(error))
}

/// A completed-with-no-data [`HandlerResult`].
#[must_use]
pub fn empty() -> HandlerResult {
    (None, None)
}
