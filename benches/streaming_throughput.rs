use cep_rs::{CEPEngine, EngineConfig, EventTypeSchema, FieldValues, ManualClock, ValueKind};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Instant;

/// Engine with `TradeEvent` registered, driven by a manual clock
fn trade_engine() -> (CEPEngine, ManualClock) {
    let clock = ManualClock::new(0);
    let schema = EventTypeSchema::builder()
        .field("Symbol", ValueKind::String)
        .field("Price", ValueKind::Float)
        .field("Quantity", ValueKind::Integer)
        .build()
        .unwrap();
    let config = EngineConfig::new("bench")
        .with_clock(clock.clone())
        .add_event_type("TradeEvent", schema);
    (CEPEngine::with_config(config).unwrap(), clock)
}

/// Generate a trade for benchmarking
fn generate_trade(id: u64) -> FieldValues {
    FieldValues::new()
        .with("Symbol", "GOOG")
        .with("Price", 700.0 + (id % 97) as f64)
        .with("Quantity", (100 + id % 10 * 100) as i64)
}

/// Benchmark: Filter statement throughput
fn benchmark_throughput_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput_filter");
    group.sample_size(10);

    let (engine, clock) = trade_engine();
    let id = engine
        .create_epl("select * from TradeEvent where Price > 750.0")
        .unwrap();
    engine.add_listener(id, |_, _| Ok(())).unwrap();

    let mut next = 0u64;
    group.bench_function("price_filter", |b| {
        b.iter(|| {
            next += 1;
            clock.set(next as i64);
            engine
                .send("TradeEvent", black_box(generate_trade(next)))
                .unwrap();
        });
    });

    group.finish();
}

/// Benchmark: Sliding max with varying window lengths
fn benchmark_throughput_window_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput_window_sizes");
    group.sample_size(10);

    // Window lengths in milliseconds, one event per millisecond
    for width in [10, 1_000, 10_000, 60_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            b.iter_custom(|iters| {
                let (engine, clock) = trade_engine();
                let id = engine
                    .create_epl(&format!(
                        "select irstream *, max(Price) from TradeEvent.win:time({} msec)",
                        width
                    ))
                    .unwrap();
                engine.add_listener(id, |_, _| Ok(())).unwrap();

                // Fill the window so every measured event also evicts one
                for t in 0..width as u64 {
                    clock.set(t as i64);
                    engine.send("TradeEvent", generate_trade(t)).unwrap();
                }

                let start = Instant::now();
                for iter in 0..iters {
                    let t = width as u64 + iter;
                    clock.set(t as i64);
                    engine
                        .send("TradeEvent", black_box(generate_trade(t)))
                        .unwrap();
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmark: Many statements over the same event type
fn benchmark_throughput_multi_statement(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput_multi_statement");
    group.sample_size(10);

    for statements in [1, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(statements),
            statements,
            |b, &statements| {
                let (engine, clock) = trade_engine();
                for i in 0..statements {
                    let id = engine
                        .create_epl(&format!(
                            "select Symbol, avg(Price) from TradeEvent.win:time({} sec) where Quantity >= {}",
                            i % 5 + 1,
                            (i % 10) * 100
                        ))
                        .unwrap();
                    engine.add_listener(id, |_, _| Ok(())).unwrap();
                }

                let mut next = 0u64;
                b.iter(|| {
                    next += 1;
                    clock.set(next as i64);
                    engine
                        .send("TradeEvent", black_box(generate_trade(next)))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_throughput_filter,
    benchmark_throughput_window_sizes,
    benchmark_throughput_multi_statement
);
criterion_main!(benches);
