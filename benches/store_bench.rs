//! Benchmarks for the coordination store and the pieces built on it.
//!
//! Benchmarks cover:
//! - Keyspace command execution (strings, lists, hashes)
//! - RESP framing of commands and replies
//! - Round trips through the in-process command loop
//! - Queue push and sweep over the store

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use bytes::BytesMut;
use host_substrate::client::CoordinationClient;
use host_substrate::config::{QueueConfig, RetryPolicy, StoreConfig};
use host_substrate::core::HandlerRegistry;
use host_substrate::queue::{job_fn, JobQueue};
use host_substrate::store::{decode_command, encode_command, spawn_store, Keyspace, Reply};
use tokio::runtime::Runtime;

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

// ============================================================================
// Keyspace
// ============================================================================

fn bench_keyspace_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyspace_set_get");

    for size in [100u64, 1000, 10000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut keyspace = Keyspace::new();
                for i in 0..size {
                    let key = format!("k{i}");
                    keyspace.execute(&args(&["SET", &key, "value"]), 0);
                    black_box(keyspace.execute(&args(&["GET", &key]), 0));
                }
            });
        });
    }
    group.finish();
}

fn bench_keyspace_list_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyspace_list_churn");

    for size in [100u64, 1000, 10000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let push = args(&["RPUSH", "jobs", "payload"]);
            let pop = args(&["LPOP", "jobs"]);
            b.iter(|| {
                let mut keyspace = Keyspace::new();
                for _ in 0..size {
                    keyspace.execute(&push, 0);
                }
                for _ in 0..size {
                    black_box(keyspace.execute(&pop, 0));
                }
            });
        });
    }
    group.finish();
}

fn bench_keyspace_hash_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyspace_hash_state");

    group.bench_function("task_record_write_read", |b| {
        let write = args(&[
            "HSET", "prod:scheduler:task:node-a:sync", "state", "scheduled", "run_count", "42",
            "next_run", "1700000000000", "is_busy", "0",
        ]);
        let read = args(&["HGETALL", "prod:scheduler:task:node-a:sync"]);
        let mut keyspace = Keyspace::new();
        b.iter(|| {
            keyspace.execute(&write, 0);
            black_box(keyspace.execute(&read, 0));
        });
    });
    group.finish();
}

// ============================================================================
// Protocol
// ============================================================================

fn bench_protocol_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol_framing");

    group.bench_function("encode_decode_command", |b| {
        let command = args(&["HSET", "key", "field", "value"]);
        b.iter(|| {
            let mut buf = BytesMut::new();
            encode_command(command.as_slice(), &mut buf);
            black_box(decode_command(&mut buf).unwrap());
        });
    });

    group.bench_function("encode_array_reply", |b| {
        let reply = Reply::bulk_array((0..64).map(|i| format!("item-{i}")));
        b.iter(|| {
            let mut buf = BytesMut::new();
            reply.encode(&mut buf);
            black_box(buf.len());
        });
    });
    group.finish();
}

// ============================================================================
// Command loop
// ============================================================================

fn bench_command_loop_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_loop_round_trip");

    for size in [100u64, 1000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let client = CoordinationClient::local(spawn_store(&StoreConfig::default()).unwrap());
                for _ in 0..size {
                    black_box(client.incr("counter").await.unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_queue_push_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_sweep");

    for size in [10u64, 100] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let client = CoordinationClient::local(spawn_store(&StoreConfig::default()).unwrap());
                let handlers = HandlerRegistry::new().with("noop", job_fn(|_job| async { Ok(()) }));
                let queue = JobQueue::new(
                    QueueConfig {
                        name: "bench".into(),
                        tick_ms: 100,
                        max_concurrency: 8,
                        retry: RetryPolicy::default(),
                    },
                    client,
                    handlers,
                )
                .unwrap();
                for i in 0..size {
                    queue.push("noop", serde_json::json!(i)).await.unwrap();
                }
                while queue.outstanding().await.unwrap() > 0 {
                    queue.sweep().await.unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    keyspace_benches,
    bench_keyspace_set_get,
    bench_keyspace_list_churn,
    bench_keyspace_hash_state
);
criterion_group!(protocol_benches, bench_protocol_framing);
criterion_group!(loop_benches, bench_command_loop_round_trip, bench_queue_push_sweep);
criterion_main!(keyspace_benches, protocol_benches, loop_benches);
