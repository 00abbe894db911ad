use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Days, NaiveDate};
use vendorflow_core::ItemId;
use vendorflow_forecast::{
    ManagedCapacity, Observation, SelectionPolicy, assess, prepare_daily_series, select_method,
};

/// Synthetic daily demand: weekly cycle, slow trend, every 11th day missing.
fn synthetic_series(days: usize) -> Vec<Observation> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let week = [12.0, 14.0, 13.0, 15.0, 22.0, 28.0, 9.0];
    (0..days)
        .filter(|i| i % 11 != 5)
        .map(|i| {
            let date = start.checked_add_days(Days::new(i as u64)).unwrap();
            Observation::new(date, week[i % 7] + 0.05 * i as f64)
        })
        .collect()
}

fn bench_assess(c: &mut Criterion) {
    let mut group = c.benchmark_group("assess");
    for days in [30usize, 365, 1825] {
        let series = synthetic_series(days);
        group.throughput(Throughput::Elements(series.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(days), &series, |b, s| {
            b.iter(|| assess(black_box(s)))
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let signals = assess(&synthetic_series(365));
    let capacity = ManagedCapacity {
        in_flight: 2,
        max_in_flight: 5,
        available: true,
    };
    let policy = SelectionPolicy::default();
    c.bench_function("select_method", |b| {
        b.iter(|| select_method(black_box(&signals), None, false, capacity, &policy))
    });
}

fn bench_prepare(c: &mut Criterion) {
    let item = ItemId::new("bench-item").unwrap();
    let mut group = c.benchmark_group("prepare_daily_series");
    for days in [90usize, 365, 1825] {
        let series = synthetic_series(days);
        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::from_parameter(days), &series, |b, s| {
            b.iter(|| {
                let prepared = prepare_daily_series(&item, black_box(s)).unwrap();
                black_box(prepared.to_csv())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assess, bench_select, bench_prepare);
criterion_main!(benches);
