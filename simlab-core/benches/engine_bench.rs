//! Criterion benchmarks for SimLab hot paths.
//!
//! Benchmarks:
//! 1. Full backtest loop (single and multi symbol)
//! 2. Bar processing with a deep resting book
//! 3. Algo slicing (TWAP submission and drain)

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use simlab_core::domain::{AlgoStrategy, Bar, OrderRequest, OrderTicket, Side};
use simlab_core::engine::{run_backtest, EngineConfig, VecFeed};
use simlab_core::execution::{ExecutionConfig, ExecutionSimulator};
use simlab_core::strategy::MaCrossover;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(symbol: &str, n: usize, phase: f64) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1 + phase).sin() * 10.0;
            Bar {
                symbol: symbol.into(),
                timestamp: base + Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64 * 1_000.0,
            }
        })
        .collect()
}

// ── 1. Backtest loop ─────────────────────────────────────────────────

fn bench_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest");
    let config = EngineConfig::default();
    let strategy = MaCrossover::new(10, 30);

    for n in [252usize, 2_520] {
        let feed = VecFeed::from_bars(make_bars("SPY", n, 0.0));
        group.bench_with_input(BenchmarkId::new("single_symbol", n), &feed, |b, feed| {
            b.iter(|| run_backtest(black_box(feed), &strategy, &config))
        });
    }

    let symbols = ["AAA", "BBB", "CCC", "DDD", "EEE"];
    let feed = VecFeed::from_bars(
        symbols
            .iter()
            .enumerate()
            .flat_map(|(i, s)| make_bars(s, 1_000, i as f64)),
    );
    group.bench_function("five_symbols_1000", |b| {
        b.iter(|| run_backtest(black_box(&feed), &strategy, &config))
    });
    group.finish();
}

// ── 2. Resting book ──────────────────────────────────────────────────

fn bench_process_bar(c: &mut Criterion) {
    let bars = make_bars("SPY", 2, 0.0);
    c.bench_function("process_bar_200_resting_limits", |b| {
        b.iter_batched(
            || {
                let mut sim = ExecutionSimulator::new(ExecutionConfig::default());
                for i in 0..200 {
                    let ticket = OrderTicket::new(
                        "SPY",
                        Side::Buy,
                        10.0,
                        OrderRequest::limit(50.0 + i as f64 * 0.1),
                    );
                    sim.submit(&ticket, &bars[0], 0, 1e12).ok();
                }
                sim
            },
            |mut sim| sim.process_bar(black_box(&bars[1]), 1, 1e12),
            criterion::BatchSize::SmallInput,
        )
    });
}

// ── 3. Algo slicing ──────────────────────────────────────────────────

fn bench_twap(c: &mut Criterion) {
    let bars = make_bars("SPY", 51, 0.0);
    let ticket = OrderTicket::new(
        "SPY",
        Side::Buy,
        10_000.0,
        OrderRequest::Algo {
            algo: AlgoStrategy::Twap { horizon: 50 },
            limit_price: None,
        },
    );
    c.bench_function("twap_50_slices", |b| {
        b.iter(|| {
            let mut sim = ExecutionSimulator::new(ExecutionConfig::default());
            sim.submit(&ticket, &bars[0], 0, 1e12).ok();
            for (step, bar) in bars.iter().enumerate().skip(1) {
                sim.process_bar(bar, step, 1e12).ok();
            }
            black_box(sim.active_schedules())
        })
    });
}

criterion_group!(benches, bench_backtest, bench_process_bar, bench_twap);
criterion_main!(benches);
