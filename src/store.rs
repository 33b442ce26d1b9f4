//! Keyed collection of result cells.
//!
//! The store maps handler ids to their [`State`] cells. Registration is
//! a single-threaded setup phase; once a run starts, the topology is
//! immutable and reads and writes on distinct ids proceed without any
//! store-level lock.

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::handler::Value;
use crate::state::State;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Identifier of a registered handler.
///
/// Ids are unique within one store/runner pair; the pair always agrees
/// on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Creates a handler id from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for HandlerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The shared result store: one single-assignment cell per handler id.
#[derive(Debug, Default)]
pub struct Store {
    states: HashMap<HandlerId, State>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh empty cell under `id`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::StateAlreadyRegistered`] if `id` is already present.
    pub fn register(&mut self, id: impl Into<HandlerId>) -> Result<(), Error> {
        let id = id.into();
        if self.states.contains_key(&id) {
            return Err(Error::new(ErrorKind::StateAlreadyRegistered)
                .with_context(format!("handler {id}")));
        }
        self.states.insert(id, State::new());
        Ok(())
    }

    /// Reads the cell under `id`, blocking until it settles or `cx` is
    /// cancelled.
    ///
    /// An unknown id yields `(None, StateNotRegistered)` immediately.
    #[must_use]
    pub fn read(&self, cx: &Cx, id: impl Into<HandlerId>) -> (Option<Value>, Option<Error>) {
        let id = id.into();
        match self.states.get(&id) {
            Some(state) => state.read(cx),
            None => (
                None,
                Some(
                    Error::new(ErrorKind::StateNotRegistered)
                        .with_context(format!("handler {id}")),
                ),
            ),
        }
    }

    /// Settles the cell under `id` with the given pair.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::StateNotRegistered`] if `id` is unknown.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already settled (see [`State::write`]).
    pub fn write(
        &self,
        id: impl Into<HandlerId>,
        value: Option<Value>,
        error: Option<Error>,
    ) -> Result<(), Error> {
        let id = id.into();
        let Some(state) = self.states.get(&id) else {
            return Err(Error::new(ErrorKind::StateNotRegistered)
                .with_context(format!("handler {id}")));
        };
        tracing::trace!(%id, has_value = value.is_some(), has_error = error.is_some(), "state settled");
        state.write(value, error);
        Ok(())
    }

    /// Returns the number of registered cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no cell is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Reads the cell under `id` and downcasts its value to `T`.
///
/// - An absent value yields `(None, raw error)` — including the legal
///   "completed with no data" `(None, None)` case.
/// - A value of a different type yields `(None, InvalidType)` naming the
///   expected type and the handler id.
/// - A successful downcast still surfaces the cell's error alongside the
///   value.
#[must_use]
pub fn read_as<T>(cx: &Cx, store: &Store, id: impl Into<HandlerId>) -> (Option<T>, Option<Error>)
where
    T: Any + Clone + Send + Sync,
{
    let id = id.into();
    let (value, error) = store.read(cx, id);
    let Some(value) = value else {
        return (None, error);
    };
    match value.downcast_ref::<T>() {
        Some(typed) => (Some(typed.clone()), error),
        None => (
            None,
            Some(Error::new(ErrorKind::InvalidType).with_context(format!(
                "{} for data from handler {id}",
                std::any::type_name::<T>()
            ))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_rejects_duplicates() {
        let mut store = Store::new();

        store.register(1).expect("first registration");
        let err = store.register(1).expect_err("duplicate registration");
        assert_eq!(err.kind(), ErrorKind::StateAlreadyRegistered);

        store.register(2).expect("second id");
        store.register(3).expect("third id");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn write_requires_registration() {
        let mut store = Store::new();

        let err = store.write(1, None, None).expect_err("unknown id");
        assert_eq!(err.kind(), ErrorKind::StateNotRegistered);

        store.register(1).expect("registration");
        store.write(1, None, None).expect("write");
    }

    #[test]
    fn read_requires_registration() {
        let mut store = Store::new();
        let cx = Cx::new();

        let (value, error) = store.read(&cx, 1);
        assert!(value.is_none());
        assert_eq!(
            error.expect("error missing").kind(),
            ErrorKind::StateNotRegistered
        );

        store.register(1).expect("registration");
        store.write(1, Some(Arc::new(42_i64)), None).expect("write");

        let (value, error) = store.read(&cx, 1);
        assert_eq!(value.expect("value").downcast_ref::<i64>(), Some(&42));
        assert!(error.is_none());
    }

    #[test]
    fn typed_read_roundtrip() {
        let mut store = Store::new();
        store.register(1).expect("registration");
        store.write(1, Some(Arc::new(1_i64)), None).expect("write");

        let cx = Cx::new();
        let (value, error) = read_as::<i64>(&cx, &store, 1);
        assert_eq!(value, Some(1));
        assert!(error.is_none());
    }

    #[test]
    fn typed_read_rejects_wrong_type() {
        let mut store = Store::new();
        store.register(1).expect("registration");
        store.write(1, Some(Arc::new(1_i64)), None).expect("write");

        let cx = Cx::new();
        let (value, error) = read_as::<String>(&cx, &store, 1);
        assert!(value.is_none());
        let error = error.expect("error missing");
        assert_eq!(error.kind(), ErrorKind::InvalidType);
        assert!(error.to_string().contains("handler 1"));
    }

    #[test]
    fn typed_read_surfaces_error_alongside_value() {
        let mut store = Store::new();
        store.register(1).expect("registration");
        store
            .write(1, Some(Arc::new(41_i64)), Some(Error::msg("partial")))
            .expect("write");

        let cx = Cx::new();
        let (value, error) = read_as::<i64>(&cx, &store, 1);
        assert_eq!(value, Some(41));
        assert_eq!(error.expect("error missing").to_string(), "partial");
    }

    #[test]
    fn typed_read_passes_through_no_data() {
        let mut store = Store::new();
        store.register(1).expect("registration");
        store.write(1, None, None).expect("write");

        let cx = Cx::new();
        let (value, error) = read_as::<i64>(&cx, &store, 1);
        assert!(value.is_none());
        assert!(error.is_none());
    }

    #[test]
    fn typed_read_observes_cancellation() {
        let mut store = Store::new();
        store.register(1).expect("registration");

        let cx = Cx::new().child();
        cx.cancel(Error::new(ErrorKind::Cancelled));

        let (value, error) = read_as::<i64>(&cx, &store, 1);
        assert!(value.is_none());
        assert_eq!(error.expect("error missing").kind(), ErrorKind::Cancelled);
    }
}
