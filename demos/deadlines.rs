//! Looping handlers cut off by per-handler deadlines.
//!
//! Each handler accumulates ticks until its context expires, then
//! returns the partial result *together with* the deadline error — a
//! legal pair.

use conflux::{timeout, Cx, HandlerResult, Registrator, Runner, Store};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TICKER_1: u64 = 0;
const TICKER_2: u64 = 1;
const TICKER_3: u64 = 2;

fn ticker(cx: &Cx, _store: &Store) -> HandlerResult {
    let started = Instant::now();
    let mut ticks: Vec<u64> = Vec::new();
    loop {
        if let Err(err) = cx.sleep(Duration::from_millis(250)) {
            return (Some(Arc::new(ticks)), Some(err));
        }
        ticks.push(started.elapsed().as_millis() as u64);
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut store = Store::new();
    let mut runner = Runner::new();

    let mut reg = Registrator::new(&mut store, &mut runner);
    reg.register_with(TICKER_1, ticker, vec![timeout(Duration::from_secs(1))])
        .expect("register ticker 1");
    reg.register_with(TICKER_2, ticker, vec![timeout(Duration::from_secs(2))])
        .expect("register ticker 2");
    reg.register_with(TICKER_3, ticker, vec![timeout(Duration::from_secs(3))])
        .expect("register ticker 3");

    let cx = Cx::new();
    if let Err(err) = runner.run(&cx, &store) {
        tracing::error!(%err, "pipeline failed");
        std::process::exit(1);
    }

    for id in [TICKER_1, TICKER_2, TICKER_3] {
        let (ticks, err) = conflux::read_as::<Vec<u64>>(&cx, &store, id);
        tracing::info!(
            handler = id,
            ticks = ?ticks,
            error = ?err.map(|e| e.to_string()),
            "ticker finished"
        );
    }

    for (id, elapsed) in runner.statistics() {
        tracing::info!(%id, ?elapsed, "handler wall time");
    }
}
