//! A staged fetch → process → notify pipeline.
//!
//! The fan-in stages read their upstream peers through the store; the
//! runtime never sees the graph, only the reads. Fetches are simulated
//! with short delays — the runtime treats handler I/O as opaque either
//! way.

use conflux::{done, fail, read_as, Cx, Error, HandlerResult, Registrator, Runner, Store};
use std::collections::BTreeSet;
use std::time::Duration;

const FETCH_DOCS: u64 = 0;
const FETCH_WIKI: u64 = 1;
const FETCH_NEWS: u64 = 2;
const PROCESS_REFERENCE: u64 = 3;
const PROCESS_PRESS: u64 = 4;
const NOTIFY: u64 = 5;

fn fetch(payload: &'static str) -> impl Fn(&Cx, &Store) -> HandlerResult + Send + Sync {
    move |cx, _store| {
        if let Err(err) = cx.sleep(Duration::from_millis(100)) {
            return fail(err);
        }
        done(payload.to_string())
    }
}

fn alphabet(contents: &[String]) -> BTreeSet<char> {
    contents.iter().flat_map(|c| c.chars()).collect()
}

fn process_reference(cx: &Cx, store: &Store) -> HandlerResult {
    let (docs, err) = read_as::<String>(cx, store, FETCH_DOCS);
    let Some(docs) = docs else {
        return (None, err);
    };
    let (wiki, err) = read_as::<String>(cx, store, FETCH_WIKI);
    let Some(wiki) = wiki else {
        return (None, err);
    };
    done(alphabet(&[docs, wiki]))
}

fn process_press(cx: &Cx, store: &Store) -> HandlerResult {
    let (news, err) = read_as::<String>(cx, store, FETCH_NEWS);
    let Some(news) = news else {
        return (None, err);
    };
    done(alphabet(&[news]))
}

fn notify(cx: &Cx, store: &Store) -> HandlerResult {
    let (reference, err) = read_as::<BTreeSet<char>>(cx, store, PROCESS_REFERENCE);
    let Some(reference) = reference else {
        return (None, err);
    };
    let (press, err) = read_as::<BTreeSet<char>>(cx, store, PROCESS_PRESS);
    let Some(press) = press else {
        return (None, err);
    };

    tracing::info!(distinct = reference.len() + press.len(), "alphabet sizes");
    (None, None)
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut store = Store::new();
    let mut runner = Runner::new();

    let mut reg = Registrator::new(&mut store, &mut runner);
    reg.register(FETCH_DOCS, fetch("the quick brown fox"))
        .expect("register docs fetch");
    reg.register(FETCH_WIKI, fetch("jumps over the lazy dog"))
        .expect("register wiki fetch");
    reg.register(FETCH_NEWS, fetch("sphinx of black quartz"))
        .expect("register news fetch");
    reg.register(PROCESS_REFERENCE, process_reference)
        .expect("register reference processing");
    reg.register(PROCESS_PRESS, process_press)
        .expect("register press processing");
    reg.register(NOTIFY, notify).expect("register notify");

    let cx = Cx::new();
    if let Err(err) = runner.run(&cx, &store) {
        tracing::error!(%err, "pipeline failed");
        std::process::exit(1);
    }

    let err = Error::join(
        read_as::<BTreeSet<char>>(&cx, &store, PROCESS_REFERENCE).1,
        read_as::<BTreeSet<char>>(&cx, &store, PROCESS_PRESS).1,
    );
    if let Some(err) = err {
        tracing::warn!(%err, "processing reported errors");
    }
}
