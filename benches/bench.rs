use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures_anyone::prelude::*;
use futures_anyone::{timeout, Context};
use futures_lite::future::block_on;

use std::time::Duration;

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("first_ok 1", |b| b.iter(|| first_ok_test(black_box(1))));
    c.bench_function("first_ok 8", |b| b.iter(|| first_ok_test(black_box(8))));
    c.bench_function("first_ok 64", |b| b.iter(|| first_ok_test(black_box(64))));
    c.bench_function("last_err 8", |b| b.iter(|| last_err_test(black_box(8))));
    c.bench_function("timeout", |b| b.iter(timeout_test));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

fn first_ok_test(max: usize) {
    let operations: Vec<_> = (0..max).map(|n| move || Ok::<_, String>(n)).collect();
    let res = block_on(operations.first_ok());
    assert!(res.is_ok());
}

fn last_err_test(max: usize) {
    let operations: Vec<_> = (0..max).map(|n| move || Err::<(), _>(format!("e{n}"))).collect();
    let res = block_on(operations.first_ok());
    assert!(res.is_err());
}

fn timeout_test() {
    let ctx = Context::background();
    let res = timeout(&ctx, || Ok::<_, String>(1), Duration::from_secs(1));
    assert_eq!(res, Ok(1));
}
