//! Property-based tests for the error-join algebra and layer
//! composition.
//!
//! # Error joining
//! - Joining never loses a kind: every joined error stays matchable
//! - The left side stays primary
//! - Display keeps every user message
//!
//! # Layer composition
//! - For any layer count, the first listed layer runs first and the raw
//!   handler runs last

mod common;

use common::init_test_logging;
use conflux::{empty, Cx, Error, ErrorKind, Handler, Layer, Registrator, Runner, Store};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

const ALL_KINDS: [ErrorKind; 11] = [
    ErrorKind::StateNotRegistered,
    ErrorKind::StateAlreadyRegistered,
    ErrorKind::HandlerAlreadyRegistered,
    ErrorKind::RunnerAlreadyStarted,
    ErrorKind::Skipped,
    ErrorKind::CriticalPath,
    ErrorKind::DeadlineExceeded,
    ErrorKind::Cancelled,
    ErrorKind::PanicRecovered,
    ErrorKind::InvalidType,
    ErrorKind::User,
];

fn any_kind() -> impl Strategy<Value = ErrorKind> {
    prop::sample::select(ALL_KINDS.to_vec())
}

proptest! {
    #[test]
    fn joining_preserves_every_kind(kinds in prop::collection::vec(any_kind(), 1..8)) {
        init_test_logging();

        let mut joined: Option<Error> = None;
        for &kind in &kinds {
            joined = Error::join(joined, Some(Error::new(kind)));
        }
        let joined = joined.expect("at least one error was joined");

        prop_assert_eq!(joined.kind(), kinds[0]);
        for &kind in &kinds {
            prop_assert!(joined.has_kind(kind), "kind {:?} lost in join", kind);
        }
    }

    #[test]
    fn joining_keeps_every_message(messages in prop::collection::vec("[a-z]{4,12}", 1..6)) {
        init_test_logging();

        let mut joined: Option<Error> = None;
        for message in &messages {
            joined = Error::join(joined, Some(Error::msg(message.clone())));
        }
        let rendered = joined.expect("joined error").to_string();

        for message in &messages {
            prop_assert!(
                rendered.contains(message.as_str()),
                "message {:?} missing from {:?}",
                message,
                rendered
            );
        }
    }

    #[test]
    fn join_with_absent_sides_is_identity(kind in any_kind()) {
        init_test_logging();

        let left = Error::join(Some(Error::new(kind)), None).expect("left identity");
        prop_assert_eq!(left.kind(), kind);

        let right = Error::join(None, Some(Error::new(kind))).expect("right identity");
        prop_assert_eq!(right.kind(), kind);

        prop_assert!(Error::join(None, None).is_none());
    }

    #[test]
    fn first_listed_layer_runs_first(count in 1_usize..8) {
        init_test_logging();

        let order = Arc::new(Mutex::new(Vec::new()));

        let mut layers: Vec<Layer> = Vec::with_capacity(count);
        for tag in (1..=count).rev() {
            let order = Arc::clone(&order);
            layers.push(Box::new(move |next: Handler| {
                let wrapped: Handler = Arc::new(move |cx: &Cx, store: &Store| {
                    order.lock().expect("order lock").push(tag);
                    next(cx, store)
                });
                wrapped
            }));
        }

        let sentinel = Arc::clone(&order);
        let mut store = Store::new();
        let mut runner = Runner::new();
        Registrator::new(&mut store, &mut runner)
            .register_with(
                1,
                move |_cx: &Cx, _store: &Store| {
                    sentinel.lock().expect("order lock").push(0);
                    empty()
                },
                layers,
            )
            .expect("registration");

        runner.run(&Cx::new(), &store).expect("run");

        let mut expected: Vec<usize> = (1..=count).rev().collect();
        expected.push(0);
        prop_assert_eq!(&*order.lock().expect("order lock"), &expected);
    }
}
