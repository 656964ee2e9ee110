//! Inproc transport benchmarks: PAIR round-trip latency and PUSH/PULL
//! throughput.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use spaceframe::{Context, Message, Protocol};

fn pair_roundtrip(c: &mut Criterion) {
    let ctx = Context::new().unwrap();
    let server = ctx.socket(Protocol::Pair).unwrap();
    server.bind("inproc://bench-pair").unwrap();
    let client = ctx.socket(Protocol::Pair).unwrap();
    client.connect("inproc://bench-pair").unwrap();

    let mut group = c.benchmark_group("pair");
    for size in [64usize, 1024, 16 * 1024] {
        let payload = Message::from_body(vec![0u8; size]);
        group.throughput(Throughput::Bytes((size * 2) as u64));
        group.bench_function(format!("roundtrip_{size}b"), |b| {
            b.iter(|| {
                client.send(payload.clone()).unwrap();
                server.recv().unwrap();
                server.send(payload.clone()).unwrap();
                client.recv().unwrap();
            });
        });
    }
    group.finish();

    server.close().unwrap();
    client.close().unwrap();
    ctx.terminate().unwrap();
}

fn pipeline_throughput(c: &mut Criterion) {
    let ctx = Context::new().unwrap();
    let pull = ctx.socket(Protocol::Pull).unwrap();
    pull.bind("inproc://bench-pipe").unwrap();
    let push = ctx.socket(Protocol::Push).unwrap();
    push.connect("inproc://bench-pipe").unwrap();

    const BATCH: usize = 256;
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("push_pull_256x64b", |b| {
        let payload = Message::from_body(vec![0u8; 64]);
        b.iter(|| {
            for _ in 0..BATCH {
                push.send(payload.clone()).unwrap();
            }
            for _ in 0..BATCH {
                pull.recv().unwrap();
            }
        });
    });
    group.finish();

    push.close().unwrap();
    pull.close().unwrap();
    ctx.terminate().unwrap();
}

criterion_group!(benches, pair_roundtrip, pipeline_throughput);
criterion_main!(benches);
