//! Paired registration of a store cell and its handler.
//!
//! Every handler id must be registered in both the store and the runner.
//! [`Registrator`] couples the two calls so callers cannot forget one
//! half.

use crate::cx::Cx;
use crate::error::Error;
use crate::handler::HandlerResult;
use crate::layer::Layer;
use crate::runner::Runner;
use crate::store::{HandlerId, Store};

/// Registers each handler id in a store and a runner in one call.
#[derive(Debug)]
pub struct Registrator<'a> {
    store: &'a mut Store,
    runner: &'a mut Runner,
}

impl<'a> Registrator<'a> {
    /// Couples a store and a runner for paired registration.
    #[must_use]
    pub fn new(store: &'a mut Store, runner: &'a mut Runner) -> Self {
        Self { store, runner }
    }

    /// Registers `id` in the store and the handler in the runner.
    ///
    /// # Errors
    ///
    /// Whatever [`Store::register`] or [`Runner::register`] reports.
    pub fn register<H>(&mut self, id: impl Into<HandlerId>, handler: H) -> Result<(), Error>
    where
        H: Fn(&Cx, &Store) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_with(id, handler, Vec::new())
    }

    /// Registers `id` in the store and the layered handler in the
    /// runner.
    ///
    /// # Errors
    ///
    /// Whatever [`Store::register`] or [`Runner::register_with`]
    /// reports.
    pub fn register_with<H>(
        &mut self,
        id: impl Into<HandlerId>,
        handler: H,
        layers: Vec<Layer>,
    ) -> Result<(), Error>
    where
        H: Fn(&Cx, &Store) -> HandlerResult + Send + Sync + 'static,
    {
        let id = id.into();
        self.store.register(id)?;
        self.runner.register_with(id, handler, layers)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handler::done;

    fn noop(_cx: &Cx, _store: &Store) -> HandlerResult {
        done("foobar")
    }

    #[test]
    fn registers_both_halves() {
        let mut store = Store::new();
        let mut runner = Runner::new();

        Registrator::new(&mut store, &mut runner)
            .register(1, noop)
            .expect("registration");

        assert_eq!(store.len(), 1);
        let err = runner.register(1, noop).expect_err("id taken in runner");
        assert_eq!(err.kind(), ErrorKind::HandlerAlreadyRegistered);
    }

    #[test]
    fn surfaces_store_conflicts() {
        let mut store = Store::new();
        store.register(1).expect("pre-registration");
        let mut runner = Runner::new();

        let err = Registrator::new(&mut store, &mut runner)
            .register(1, noop)
            .expect_err("state already registered");
        assert_eq!(err.kind(), ErrorKind::StateAlreadyRegistered);
    }

    #[test]
    fn surfaces_runner_conflicts() {
        let mut store = Store::new();
        let mut runner = Runner::new();
        runner.register(1, noop).expect("pre-registration");

        let err = Registrator::new(&mut store, &mut runner)
            .register(1, noop)
            .expect_err("handler already registered");
        assert_eq!(err.kind(), ErrorKind::HandlerAlreadyRegistered);
    }
}
