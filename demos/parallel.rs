//! Two independent computations running in parallel.

use conflux::{done, read_as, Cx, HandlerResult, Registrator, Runner, Store};

const FIBONACCI: u64 = 0;
const SQUARES: u64 = 1;

fn fibonacci(n: u64) -> impl Fn(&Cx, &Store) -> HandlerResult + Send + Sync {
    move |_cx, _store| {
        let (mut a, mut b) = (0_u64, 1_u64);
        for _ in 2..=n {
            let next = a + b;
            a = b;
            b = next;
        }
        done(b)
    }
}

fn sum_of_squares(n: u64) -> impl Fn(&Cx, &Store) -> HandlerResult + Send + Sync {
    move |_cx, _store| done((2..=n).map(|i| i * i).sum::<u64>())
}

fn main() {
    tracing_subscriber::fmt().init();

    let mut store = Store::new();
    let mut runner = Runner::new();

    let mut reg = Registrator::new(&mut store, &mut runner);
    reg.register(FIBONACCI, fibonacci(10))
        .expect("register fibonacci handler");
    reg.register(SQUARES, sum_of_squares(10))
        .expect("register squares handler");

    let cx = Cx::new();
    if let Err(err) = runner.run(&cx, &store) {
        tracing::error!(%err, "pipeline failed");
        std::process::exit(1);
    }

    let (fib, err) = read_as::<u64>(&cx, &store, FIBONACCI);
    tracing::info!(result = ?fib, error = ?err.map(|e| e.to_string()), "fibonacci handler");

    let (squares, err) = read_as::<u64>(&cx, &store, SQUARES);
    tracing::info!(result = ?squares, error = ?err.map(|e| e.to_string()), "squares handler");
}
