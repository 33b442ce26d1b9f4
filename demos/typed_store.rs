//! A strongly-typed façade over the shared store.
//!
//! Handlers that dislike the type-erased surface can wrap the store in a
//! domain-specific view with typed getters; the runtime stays unaware.

use conflux::{done, read_as, Cx, Error, HandlerResult, Registrator, Runner, Store};
use std::collections::BTreeSet;
use std::time::Duration;

const FETCH: u64 = 0;
const PROCESS: u64 = 1;
const NOTIFY: u64 = 2;

/// Typed getters for this pipeline's intermediate results.
struct PipelineView<'a> {
    store: &'a Store,
}

impl<'a> PipelineView<'a> {
    fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn fetched(&self, cx: &Cx) -> Result<String, Error> {
        let (content, err) = read_as::<String>(cx, self.store, FETCH);
        match err {
            Some(err) => Err(err),
            None => content.ok_or_else(|| Error::msg("fetch produced no data")),
        }
    }

    fn alphabet(&self, cx: &Cx) -> Result<BTreeSet<char>, Error> {
        let (alphabet, err) = read_as::<BTreeSet<char>>(cx, self.store, PROCESS);
        match err {
            Some(err) => Err(err),
            None => alphabet.ok_or_else(|| Error::msg("processing produced no data")),
        }
    }
}

fn fetch(cx: &Cx, _store: &Store) -> HandlerResult {
    if let Err(err) = cx.sleep(Duration::from_millis(100)) {
        return (None, Some(err));
    }
    done("pack my box with five dozen liquor jugs".to_string())
}

fn process(cx: &Cx, store: &Store) -> HandlerResult {
    match PipelineView::new(store).fetched(cx) {
        Ok(content) => done(content.chars().collect::<BTreeSet<char>>()),
        Err(err) => (None, Some(err)),
    }
}

fn notify(cx: &Cx, store: &Store) -> HandlerResult {
    match PipelineView::new(store).alphabet(cx) {
        Ok(alphabet) => {
            tracing::info!(distinct = alphabet.len(), "alphabet size");
            (None, None)
        }
        Err(err) => (None, Some(err)),
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut store = Store::new();
    let mut runner = Runner::new();

    let mut reg = Registrator::new(&mut store, &mut runner);
    reg.register(FETCH, fetch).expect("register fetch");
    reg.register(PROCESS, process).expect("register process");
    reg.register(NOTIFY, notify).expect("register notify");

    let cx = Cx::new();
    if let Err(err) = runner.run(&cx, &store) {
        tracing::error!(%err, "pipeline failed");
        std::process::exit(1);
    }
}
