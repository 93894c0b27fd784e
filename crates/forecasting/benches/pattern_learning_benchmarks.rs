use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use stockcast_core::{CategoryId, ProductId};
use stockcast_forecasting::patterns::analysis::{self, DailyDemand, OccurrenceAnalysis};
use stockcast_forecasting::patterns::{CalendarEvent, EventCatalogue};
use stockcast_forecasting::timeseries::{DemandMetric, TransactionRecord};

/// `years` of daily sales over `products` products, with a December bump.
fn synthetic_history(years: u32, products: usize) -> (Vec<TransactionRecord>, BTreeMap<CategoryId, String>) {
    let category = CategoryId::new();
    let mut slugs = BTreeMap::new();
    slugs.insert(category, "food_beverages".to_string());

    let product_ids: Vec<ProductId> = (0..products).map(|_| ProductId::new()).collect();
    let start = NaiveDate::from_ymd_opt(2024 - years as i32, 1, 1).unwrap();
    let days = 365 * years as u64;

    let mut records = Vec::with_capacity(days as usize * products);
    for offset in 0..days {
        let date = start + Days::new(offset);
        let bump = if date.month() == 12 { 1.6 } else { 1.0 };
        for (i, p) in product_ids.iter().enumerate() {
            let qty = (10.0 + (offset % 7) as f64 + i as f64) * bump;
            let mut r = TransactionRecord::sale(date, *p, qty, 2.5);
            if i % 2 == 0 {
                r = r.with_category(category);
            }
            records.push(r);
        }
    }
    (records, slugs)
}

fn occurrences(demand: &DailyDemand, event: &CalendarEvent, years: u32) -> Vec<OccurrenceAnalysis> {
    let categories = event.affected_categories.clone();
    event
        .occurrences(2024 - years as i32, 2023, 14, 7)
        .into_iter()
        .filter_map(|w| analysis::analyze_occurrence(demand, w, &categories))
        .collect()
}

fn bench_daily_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("daily_demand_aggregation");
    for products in [10usize, 50, 200] {
        let (records, slugs) = synthetic_history(2, products);
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(products), &records, |b, records| {
            b.iter(|| DailyDemand::from_records(black_box(records), DemandMetric::Quantity, &slugs))
        });
    }
    group.finish();
}

fn bench_event_analysis(c: &mut Criterion) {
    let catalogue = EventCatalogue::indonesian_retail();
    let mut group = c.benchmark_group("event_occurrence_analysis");
    for years in [1u32, 2, 3] {
        let (records, slugs) = synthetic_history(years, 20);
        let demand = DailyDemand::from_records(&records, DemandMetric::Quantity, &slugs);
        group.bench_with_input(BenchmarkId::from_parameter(years), &demand, |b, demand| {
            b.iter(|| {
                for event in catalogue.events() {
                    let occ = occurrences(black_box(demand), event, years);
                    black_box(analysis::aggregate(&occ));
                }
            })
        });
    }
    group.finish();
}

fn bench_confidence_scoring(c: &mut Criterion) {
    let multipliers: Vec<f64> = (0..32).map(|i| 1.2 + (i % 5) as f64 * 0.05).collect();
    c.bench_function("confidence_scoring", |b| {
        b.iter(|| {
            let m = black_box(&multipliers);
            analysis::confidence(
                400,
                analysis::variability_score(m),
                analysis::trend_stability(m),
                analysis::significance(m),
                m.len() as u32,
            )
        })
    });
}

criterion_group!(
    benches,
    bench_daily_aggregation,
    bench_event_analysis,
    bench_confidence_scoring
);
criterion_main!(benches);
