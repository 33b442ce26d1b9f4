//! The fan-out executor.
//!
//! `Runner` owns the handler table. `run` spawns one named OS thread per
//! registered handler under a shared cancellable child context, writes
//! every handler's outcome into the store — unconditionally, so readers
//! never deadlock — and records per-handler wall time. A critical-path
//! failure trips a one-shot kill-switch that cancels the remaining work
//! with the failure as the cause.

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::handler::{Handler, HandlerResult};
use crate::layer::{wrap, Layer};
use crate::store::{HandlerId, Store};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for a [`Runner`].
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Prefix for handler thread names (`{prefix}-{id}`).
    pub thread_name_prefix: String,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            thread_name_prefix: "conflux".to_string(),
        }
    }
}

/// The fan-out executor: registration, parallel launch, fault isolation,
/// cancellation and statistics.
///
/// A runner is single-shot: register during setup, `run` exactly once,
/// then read statistics.
pub struct Runner {
    handlers: HashMap<HandlerId, Handler>,
    statistics: Mutex<HashMap<HandlerId, Duration>>,
    started: AtomicBool,
    options: RunnerOptions,
}

impl Runner {
    /// Creates a runner with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RunnerOptions::default())
    }

    /// Creates a runner with the given options.
    #[must_use]
    pub fn with_options(options: RunnerOptions) -> Self {
        Self {
            handlers: HashMap::new(),
            statistics: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            options,
        }
    }

    /// Registers a handler under `id` with no layers.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::HandlerAlreadyRegistered`] if `id` is taken.
    pub fn register<H>(&mut self, id: impl Into<HandlerId>, handler: H) -> Result<(), Error>
    where
        H: Fn(&Cx, &Store) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_with(id, handler, Vec::new())
    }

    /// Registers a handler wrapped in the given layers, first listed
    /// outermost. An empty layer list stores the raw handler unchanged.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::HandlerAlreadyRegistered`] if `id` is taken.
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
        if self.handlers.contains_key(&id) {
            return Err(Error::new(ErrorKind::HandlerAlreadyRegistered)
                .with_context(format!("handler {id}")));
        }
        self.handlers.insert(id, wrap(Arc::new(handler), layers));
        Ok(())
    }

    /// Runs every registered handler concurrently and waits for all of
    /// them.
    ///
    /// Each handler executes on its own named thread under a shared
    /// child of `cx`. Its `(value, error)` outcome is written to the
    /// store whether it succeeded, failed or panicked, so peers blocked
    /// on its cell always unblock. Handler failures are not fatal — they
    /// live in the cell and `run` returns `Ok`. The exceptions:
    ///
    /// - a critical-path failure cancels the shared context (first
    ///   failure wins) and surfaces from `run`;
    /// - a panic is reified as a [`ErrorKind::PanicRecovered`] error and
    ///   surfaces from `run`, joined with any error from the forced
    ///   cell resolution.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::RunnerAlreadyStarted`] on a second call; otherwise
    /// the join of all task errors as described above.
    pub fn run(&self, cx: &Cx, store: &Store) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::RunnerAlreadyStarted));
        }

        let run_cx = cx.child();
        let killswitch = AtomicBool::new(false);
        tracing::debug!(handlers = self.handlers.len(), "run started");

        let mut run_error: Option<Error> = None;
        thread::scope(|scope| {
            let mut tasks = Vec::with_capacity(self.handlers.len());
            for (&id, handler) in &self.handlers {
                let run_cx = run_cx.clone();
                let handler = Arc::clone(handler);
                let killswitch = &killswitch;
                let statistics = &self.statistics;
                let task = thread::Builder::new()
                    .name(format!("{}-{id}", self.options.thread_name_prefix))
                    .spawn_scoped(scope, move || {
                        let _stat = StatGuard {
                            statistics,
                            id,
                            started_at: Instant::now(),
                        };
                        execute_one(id, &handler, &run_cx, store, killswitch)
                    })
                    .expect("failed to spawn handler thread");
                tasks.push(task);
            }

            for task in tasks {
                let task_error = match task.join() {
                    Ok(task_error) => task_error,
                    // The task body never unwinds past its fault
                    // barrier; reify here if one ever does.
                    Err(payload) => Some(
                        Error::new(ErrorKind::PanicRecovered)
                            .with_context(panic_message(payload.as_ref())),
                    ),
                };
                run_error = Error::join(run_error.take(), task_error);
            }
        });
        run_cx.cancel(Error::new(ErrorKind::Cancelled));

        tracing::debug!(ok = run_error.is_none(), "run finished");
        match run_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns a snapshot of per-handler elapsed wall time.
    ///
    /// Safe to call after `run` returns; during `run` it yields a
    /// partial view covering the handlers that have finished.
    #[must_use]
    pub fn statistics(&self) -> HashMap<HandlerId, Duration> {
        self.statistics.lock().clone()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("handlers", &self.handlers.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

/// Records elapsed wall time on drop, so statistics survive every exit
/// path, including a faulting cell resolution.
struct StatGuard<'a> {
    statistics: &'a Mutex<HashMap<HandlerId, Duration>>,
    id: HandlerId,
    started_at: Instant,
}

impl Drop for StatGuard<'_> {
    fn drop(&mut self) {
        self.statistics
            .lock()
            .insert(self.id, self.started_at.elapsed());
    }
}

/// Runs one handler behind the fault barrier and settles its cell.
///
/// The barrier covers the whole task body, the final cell write
/// included, so no unwind ever escapes the spawned thread.
fn execute_one(
    id: HandlerId,
    handler: &Handler,
    run_cx: &Cx,
    store: &Store,
    killswitch: &AtomicBool,
) -> Option<Error> {
    tracing::trace!(%id, "handler started");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let (value, error) = handler(run_cx, store);
        let mut task_error = None;
        if let Some(err) = error.as_ref() {
            if err.has_kind(ErrorKind::CriticalPath) {
                // Only the first critical failure sets the cancel
                // cause; every responsible task still reports it.
                if !killswitch.swap(true, Ordering::SeqCst) {
                    tracing::debug!(%id, cause = %err, "critical path failure, cancelling run");
                    run_cx.cancel(err.clone());
                }
                task_error = Some(err.clone());
            }
        }
        let write_error = store.write(id, value, error).err();
        Error::join(task_error, write_error)
    }));
    match outcome {
        Ok(task_error) => task_error,
        Err(payload) => {
            let reified = Error::new(ErrorKind::PanicRecovered)
                .with_context(panic_message(payload.as_ref()));
            tracing::warn!(%id, message = %reified, "handler panicked, force-resolving its state");
            let mut task_error = Some(reified.clone());
            // Resolving can fault again when the fault was a double
            // write and the cell is already settled; readers are
            // unblocked either way.
            match panic::catch_unwind(AssertUnwindSafe(|| store.write(id, None, Some(reified)))) {
                Ok(Err(write_error)) => {
                    task_error = Error::join(task_error, Some(write_error));
                }
                Ok(Ok(())) | Err(_) => {}
            }
            task_error
        }
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::done;

    #[test]
    fn register_rejects_duplicates() {
        let mut runner = Runner::new();

        runner
            .register(41, |_cx: &Cx, _store: &Store| done("foobar"))
            .expect("first registration");

        let err = runner
            .register(41, |_cx: &Cx, _store: &Store| done("foobar"))
            .expect_err("duplicate registration");
        assert_eq!(err.kind(), ErrorKind::HandlerAlreadyRegistered);
    }

    #[test]
    fn second_run_is_rejected() {
        let mut store = Store::new();
        store.register(1).expect("registration");

        let mut runner = Runner::new();
        runner
            .register(1, |_cx: &Cx, _store: &Store| done("foobar"))
            .expect("registration");

        let cx = Cx::new();
        runner.run(&cx, &store).expect("first run");
        let err = runner.run(&cx, &store).expect_err("second run");
        assert_eq!(err.kind(), ErrorKind::RunnerAlreadyStarted);
    }

    #[test]
    fn run_with_no_handlers_is_ok() {
        let runner = Runner::new();
        runner.run(&Cx::new(), &Store::new()).expect("empty run");
    }

    #[test]
    fn statistics_cover_wall_time() {
        let mut store = Store::new();
        store.register(1).expect("registration");

        let mut runner = Runner::new();
        runner
            .register(1, |cx: &Cx, _store: &Store| {
                match cx.sleep(Duration::from_millis(50)) {
                    Ok(()) => (None, None),
                    Err(err) => (None, Some(err)),
                }
            })
            .expect("registration");

        runner.run(&Cx::new(), &store).expect("run");

        let statistics = runner.statistics();
        let elapsed = statistics
            .get(&HandlerId::new(1))
            .copied()
            .expect("statistic missing");
        assert!(elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn handler_writing_its_own_cell_is_reified_as_a_fault() {
        let mut store = Store::new();
        store.register(5).expect("registration");

        let mut runner = Runner::new();
        runner
            .register(5, |_cx: &Cx, store: &Store| {
                store
                    .write(5, Some(Arc::new(9_i64)), None)
                    .expect("write own cell");
                done("ignored")
            })
            .expect("registration");

        let err = runner
            .run(&Cx::new(), &store)
            .expect_err("double write surfaces from run");
        assert!(err.has_kind(ErrorKind::PanicRecovered));
        assert!(err.to_string().contains("written twice"));

        // The handler's own write settled the cell; readers observe it.
        let (value, error) = store.read(&Cx::new(), 5);
        assert_eq!(value.expect("value").downcast_ref::<i64>(), Some(&9));
        assert!(error.is_none());

        let statistics = runner.statistics();
        assert!(statistics.contains_key(&HandlerId::new(5)));
    }

    #[test]
    fn thread_names_carry_the_configured_prefix() {
        let mut store = Store::new();
        store.register(7).expect("registration");

        let mut runner = Runner::with_options(RunnerOptions {
            thread_name_prefix: "pipeline".to_string(),
        });
        runner
            .register(7, |_cx: &Cx, _store: &Store| {
                let name = thread::current().name().map(str::to_string);
                (Some(Arc::new(name)), None)
            })
            .expect("registration");

        runner.run(&Cx::new(), &store).expect("run");

        let (value, _) = store.read(&Cx::new(), 7);
        let name = value
            .expect("value")
            .downcast_ref::<Option<String>>()
            .cloned()
            .flatten()
            .expect("thread name");
        assert_eq!(name, "pipeline-7");
    }
}
