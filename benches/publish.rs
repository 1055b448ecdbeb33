//! Performance benchmarks for miniqueue
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use miniqueue::{Broker, MemoryStore, Value};
use std::sync::Arc;

fn bench_value_creation(c: &mut Criterion) {
    c.bench_function("Value::from", |b| {
        b.iter(|| Value::from("a reasonably sized message payload"));
    });
}

fn bench_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("Broker publish", |b| {
        b.to_async(&rt).iter(|| async {
            let broker = Broker::new(Arc::new(MemoryStore::new()));
            broker
                .publish("bench", Value::from("payload"))
                .await
                .unwrap()
        });
    });
}

fn bench_publish_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("publish_throughput");
    for count in [10, 100, 1000] {
        group.bench_function(format!("{} values", count), |b| {
            b.to_async(&rt).iter(|| async {
                let broker = Broker::new(Arc::new(MemoryStore::new()));
                for i in 0..count {
                    broker
                        .publish("bench", Value::from(format!("value {}", i).into_bytes()))
                        .await
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_delivery_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("publish → next → ack", |b| {
        b.to_async(&rt).iter(|| async {
            let broker = Broker::new(Arc::new(MemoryStore::new()));
            let consumer = broker.subscribe("bench").await.unwrap();

            broker
                .publish("bench", Value::from("round trip"))
                .await
                .unwrap();
            let value = consumer.next().await.unwrap();
            consumer.ack().await.unwrap();
            value
        });
    });
}

fn bench_drain_queue(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("drain 100 values", |b| {
        b.to_async(&rt).iter(|| async {
            let broker = Broker::new(Arc::new(MemoryStore::new()));
            for i in 0..100 {
                broker
                    .publish("bench", Value::from(format!("value {}", i).into_bytes()))
                    .await
                    .unwrap();
            }

            let consumer = broker.subscribe("bench").await.unwrap();
            for _ in 0..100 {
                consumer.next().await.unwrap();
                consumer.ack().await.unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_value_creation,
    bench_memory_publish,
    bench_publish_throughput,
    bench_delivery_round_trip,
    bench_drain_queue,
);
criterion_main!(benches);
