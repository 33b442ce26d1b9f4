//! Conflux: an in-process dataflow task runtime with cancel-correct result cells.
//!
//! # Overview
//!
//! Conflux runs a set of named computations ("handlers", keyed by
//! integer ids) concurrently and gives every handler a shared result
//! store through which it can await any peer's outcome. Dependencies are
//! implicit: a handler that reads a peer's cell waits for that peer, and
//! nothing else imposes an order. The runtime performs no topological
//! analysis — the wait graph emerges from the reads the handlers choose
//! to do.
//!
//! # Core Guarantees
//!
//! - **Readers never deadlock**: every handler's cell is settled on every
//!   exit path — success, error, even a panic (reified as a typed error).
//! - **Single assignment**: a cell is written once; all past and future
//!   reads observe the exact pair written.
//! - **Cancellation is a protocol**: cancel causes propagate parent to
//!   child, the first cause wins, and blocked reads wake promptly.
//! - **Critical path aborts the run**: the first critical failure cancels
//!   the remaining work with itself as the cause and surfaces from
//!   [`Runner::run`].
//!
//! # Module Structure
//!
//! - [`error`]: sentinel error kinds and the joining strategy
//! - [`cx`]: the cancellation context handlers observe
//! - [`state`]: the single-assignment result cell
//! - [`store`]: keyed cells and the typed read helper
//! - [`handler`]: handler shape and result constructors
//! - [`layer`]: composable middleware (timeout, condition, critical
//!   path, run-after)
//! - [`runner`]: the fan-out executor
//! - [`registrator`]: paired store/runner registration
//!
//! # Quick Start
//!
//! ```
//! use conflux::{done, read_as, Cx, Registrator, Runner, Store};
//!
//! let mut store = Store::new();
//! let mut runner = Runner::new();
//!
//! let mut reg = Registrator::new(&mut store, &mut runner);
//! reg.register(1, |_cx, _store| done(6_i64)).unwrap();
//! reg.register(2, |cx, store| {
//!     let (six, err) = read_as::<i64>(cx, store, 1);
//!     match (six, err) {
//!         (Some(six), None) => done(six * 7),
//!         (_, err) => (None, err),
//!     }
//! })
//! .unwrap();
//!
//! let cx = Cx::new();
//! runner.run(&cx, &store).unwrap();
//!
//! let (answer, _) = read_as::<i64>(&cx, &store, 2);
//! assert_eq!(answer, Some(42));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cx;
pub mod error;
pub mod handler;
pub mod layer;
pub mod registrator;
pub mod runner;
pub mod state;
pub mod store;

pub use cx::Cx;
pub use error::{Error, ErrorKind};
pub use handler::{done, empty, fail, Handler, HandlerResult, Value};
pub use layer::{condition, critical_path, run_after, timeout, Layer};
pub use registrator::Registrator;
pub use runner::{Runner, RunnerOptions};
pub use state::State;
pub use store::{read_as, HandlerId, Store};
