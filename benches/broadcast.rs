//! Measures producer send latency as the listener count grows, matching the
//! non-blocking-producer property (P1) this crate is built around: the
//! teacher's own bench harness (`#![feature(test)]` + nightly `test::Bencher`)
//! isn't usable on stable, so this uses `criterion` instead — already present
//! in the teacher's manifest, just unused by its retrieved source.

use condutto::Broadcaster;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

fn send_with_n_listeners(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcaster_send");
    for n in [0usize, 1, 8, 35] {
        group.bench_function(format!("listeners={n}"), |b| {
            b.to_async(&rt).iter_batched(
                || {
                    let (tx, rx) = mpsc::channel::<i32>(1);
                    let broadcaster = Broadcaster::new(rx);
                    (tx, broadcaster)
                },
                |(tx, broadcaster)| async move {
                    let mut cancels = Vec::with_capacity(n);
                    for _ in 0..n {
                        let (_rx, cancel) = broadcaster.listen().await;
                        cancels.push(cancel);
                    }
                    tx.send(1).await.unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, send_with_n_listeners);
criterion_main!(benches);
