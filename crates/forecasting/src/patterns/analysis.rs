//! Window statistics, multiplier aggregation and confidence scoring.
//!
//! Everything here is pure so the learner and the Ramadan learner can share it
//! and it can be exercised without any I/O.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockcast_core::CategoryId;

use crate::patterns::calendar::{DateWindow, EventWindows};
use crate::stats;
use crate::timeseries::{DemandMetric, TransactionRecord};

#[derive(Debug, Copy, Clone, Default, PartialEq)]
struct DayTotal {
    value: f64,
    samples: u64,
}

/// Daily demand totals, overall and per category slug.
#[derive(Debug, Clone, Default)]
pub struct DailyDemand {
    totals: BTreeMap<NaiveDate, DayTotal>,
    by_category: BTreeMap<String, BTreeMap<NaiveDate, DayTotal>>,
}

impl DailyDemand {
    pub fn from_records(
        records: &[TransactionRecord],
        metric: DemandMetric,
        category_slugs: &BTreeMap<CategoryId, String>,
    ) -> Self {
        let mut out = Self::default();
        for r in records {
            if !r.contributes_to_demand() {
                continue;
            }
            let v = r.demand_value(metric);
            let t = out.totals.entry(r.date).or_default();
            t.value += v;
            t.samples += 1;

            if let Some(slug) = r.category_id.and_then(|c| category_slugs.get(&c)) {
                let t = out
                    .by_category
                    .entry(slug.clone())
                    .or_default()
                    .entry(r.date)
                    .or_default();
                t.value += v;
                t.samples += 1;
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn window(&self, w: DateWindow) -> WindowStats {
        window_stats(&self.totals, w)
    }

    pub fn category_window(&self, slug: &str, w: DateWindow) -> WindowStats {
        self.by_category
            .get(slug)
            .map(|days| window_stats(days, w))
            .unwrap_or_default()
    }
}

fn window_stats(days: &BTreeMap<NaiveDate, DayTotal>, w: DateWindow) -> WindowStats {
    let mut s = WindowStats::default();
    for (_, t) in days.range(w.start..=w.end) {
        s.total += t.value;
        s.samples += t.samples;
        s.active_days += 1;
    }
    s
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub total: f64,
    pub active_days: u32,
    pub samples: u64,
}

impl WindowStats {
    /// Sum over distinct active days; 0 for an empty window.
    pub fn daily_average(&self) -> f64 {
        if self.active_days == 0 {
            0.0
        } else {
            self.total / self.active_days as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_days == 0
    }
}

/// `window / baseline`, neutral when the baseline average is zero.
pub fn ratio(window: &WindowStats, baseline: &WindowStats) -> f64 {
    let base = baseline.daily_average();
    if base.abs() <= f64::EPSILON {
        return 1.0;
    }
    (window.daily_average() / base).max(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceQuality {
    pub baseline_samples: u64,
    pub event_samples: u64,
    /// Sample stdev of the pre/event/post multipliers.
    pub variability: f64,
    pub reliability: f64,
}

/// Multipliers of a single event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceAnalysis {
    pub windows: EventWindows,
    pub pre: f64,
    pub event: f64,
    pub post: f64,
    pub category_multipliers: BTreeMap<String, f64>,
    pub quality: OccurrenceQuality,
}

/// `None` when the baseline window has no demand at all.
pub fn analyze_occurrence(
    demand: &DailyDemand,
    windows: EventWindows,
    categories: &[String],
) -> Option<OccurrenceAnalysis> {
    let baseline = demand.window(windows.baseline);
    if baseline.is_empty() {
        return None;
    }
    let event_stats = demand.window(windows.event);

    let pre = ratio(&demand.window(windows.pre), &baseline);
    let event = ratio(&event_stats, &baseline);
    let post = ratio(&demand.window(windows.post), &baseline);

    let mut category_multipliers = BTreeMap::new();
    for slug in categories {
        let cat_base = demand.category_window(slug, windows.baseline);
        if cat_base.is_empty() {
            continue;
        }
        let cat_event = demand.category_window(slug, windows.event);
        category_multipliers.insert(slug.clone(), ratio(&cat_event, &cat_base));
    }

    Some(OccurrenceAnalysis {
        windows,
        pre,
        event,
        post,
        category_multipliers,
        quality: OccurrenceQuality {
            baseline_samples: baseline.samples,
            event_samples: event_stats.samples,
            variability: stats::stddev_sample(&[pre, event, post]),
            reliability: (baseline.samples as f64 / 100.0).min(1.0),
        },
    })
}

/// Cross-occurrence aggregate of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEffect {
    pub pre: f64,
    pub during: f64,
    pub post: f64,
    pub category_multipliers: BTreeMap<String, f64>,
    pub sample_size: u64,
    pub occurrences: u32,
    pub variability_score: f64,
    pub trend_stability: f64,
    pub significance: f64,
}

impl AggregatedEffect {
    pub fn confidence(&self) -> f64 {
        confidence(
            self.sample_size,
            self.variability_score,
            self.trend_stability,
            self.significance,
            self.occurrences,
        )
    }
}

/// Order-independent aggregate; `None` for an empty slice.
pub fn aggregate(occurrences: &[OccurrenceAnalysis]) -> Option<AggregatedEffect> {
    if occurrences.is_empty() {
        return None;
    }

    let event_multipliers = sorted(occurrences.iter().map(|o| o.event));

    let mut per_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for o in occurrences {
        for (slug, m) in &o.category_multipliers {
            per_category.entry(slug.as_str()).or_default().push(*m);
        }
    }
    let category_multipliers = per_category
        .into_iter()
        .map(|(slug, ms)| (slug.to_string(), positive_mean(&sorted(ms.into_iter()))))
        .collect();

    let sample_size = occurrences
        .iter()
        .map(|o| o.quality.baseline_samples + o.quality.event_samples)
        .sum();

    Some(AggregatedEffect {
        pre: positive_mean(&sorted(occurrences.iter().map(|o| o.pre))),
        during: positive_mean(&event_multipliers),
        post: positive_mean(&sorted(occurrences.iter().map(|o| o.post))),
        category_multipliers,
        sample_size,
        occurrences: occurrences.len() as u32,
        variability_score: variability_score(&event_multipliers),
        trend_stability: trend_stability(&event_multipliers),
        significance: significance(&event_multipliers),
    })
}

/// `max(0, 1 - stdev/mean)` over the event multipliers.
pub fn variability_score(multipliers: &[f64]) -> f64 {
    let m = stats::mean(multipliers);
    if m <= f64::EPSILON {
        return 0.0;
    }
    (1.0 - stats::stddev_sample(multipliers) / m).max(0.0)
}

/// `max(0, 1 - CV)`; 0.5 with fewer than three occurrences.
pub fn trend_stability(multipliers: &[f64]) -> f64 {
    if multipliers.len() < 3 {
        return 0.5;
    }
    (1.0 - stats::coefficient_of_variation(multipliers).abs()).max(0.0)
}

/// Heuristic significance: `|t| / 3` clamped to `[0.1, 0.99]`, t tested against 1.0.
///
/// This is not a calibrated p-value.
pub fn significance(multipliers: &[f64]) -> f64 {
    match stats::t_statistic(multipliers, 1.0) {
        Some(t) => stats::clamp(t.abs() / 3.0, 0.1, 0.99),
        None => 0.1,
    }
}

pub fn confidence(sample_size: u64, variability: f64, trend: f64, significance: f64, occurrences: u32) -> f64 {
    let score = 0.5
        + 0.20 * (sample_size as f64 / 500.0).min(1.0)
        + 0.15 * variability
        + 0.10 * trend
        + 0.10 * significance
        + 0.05 * (occurrences as f64 / 3.0).min(1.0);
    stats::clamp(score, 0.1, 1.0)
}

/// Mean of the positive values; neutral when there are none.
pub(crate) fn positive_mean(xs: &[f64]) -> f64 {
    let positives: Vec<f64> = xs.iter().copied().filter(|x| *x > 0.0).collect();
    if positives.is_empty() {
        return 1.0;
    }
    stats::mean(&positives)
}

fn sorted(xs: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = xs.collect();
    v.sort_by(f64::total_cmp);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::calendar::EventWindows;
    use proptest::prelude::*;
    use stockcast_core::ProductId;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn occurrence(event: f64) -> OccurrenceAnalysis {
        let windows = EventWindows::new(d(2024, 4, 9), 7, 14, 7).unwrap();
        OccurrenceAnalysis {
            windows,
            pre: 1.1,
            event,
            post: 0.9,
            category_multipliers: BTreeMap::new(),
            quality: OccurrenceQuality {
                baseline_samples: 70,
                event_samples: 70,
                variability: 0.0,
                reliability: 0.7,
            },
        }
    }

    #[test]
    fn baseline_100_event_145_gives_1_45() {
        let p = ProductId::new();
        let w = EventWindows::new(d(2024, 4, 9), 7, 14, 7).unwrap();
        let mut records = Vec::new();
        for i in 0..7u64 {
            let base_day = w.baseline.start + chrono::Days::new(i);
            let event_day = w.event.start + chrono::Days::new(i);
            records.push(TransactionRecord::sale(base_day, p, 100.0, 1.0));
            records.push(TransactionRecord::sale(event_day, p, 145.0, 1.0));
        }
        let demand = DailyDemand::from_records(&records, DemandMetric::Quantity, &BTreeMap::new());
        let a = analyze_occurrence(&demand, w, &[]).unwrap();
        assert!((a.event - 1.45).abs() < 1e-9);
        assert_eq!(a.quality.baseline_samples, 7);
        // Empty pre/post windows read as zero demand.
        assert_eq!(a.pre, 0.0);
    }

    #[test]
    fn empty_baseline_discards_occurrence() {
        let p = ProductId::new();
        let w = EventWindows::new(d(2024, 4, 9), 7, 14, 7).unwrap();
        let records = vec![TransactionRecord::sale(w.event.start, p, 10.0, 1.0)];
        let demand = DailyDemand::from_records(&records, DemandMetric::Quantity, &BTreeMap::new());
        assert!(analyze_occurrence(&demand, w, &[]).is_none());
    }

    #[test]
    fn daily_average_uses_distinct_active_days() {
        let p = ProductId::new();
        let records = vec![
            TransactionRecord::sale(d(2024, 1, 1), p, 10.0, 1.0),
            TransactionRecord::sale(d(2024, 1, 1), p, 10.0, 1.0),
            TransactionRecord::sale(d(2024, 1, 3), p, 40.0, 1.0),
        ];
        let demand = DailyDemand::from_records(&records, DemandMetric::Quantity, &BTreeMap::new());
        let s = demand.window(DateWindow { start: d(2024, 1, 1), end: d(2024, 1, 7) });
        assert_eq!(s.active_days, 2);
        assert_eq!(s.samples, 3);
        assert_eq!(s.daily_average(), 30.0);
    }

    #[test]
    fn zero_baseline_average_is_neutral() {
        let base = WindowStats { total: 0.0, active_days: 3, samples: 3 };
        let window = WindowStats { total: 50.0, active_days: 5, samples: 5 };
        assert_eq!(ratio(&window, &base), 1.0);
    }

    #[test]
    fn category_multipliers_use_registered_slugs() {
        let p = ProductId::new();
        let food = CategoryId::new();
        let other = CategoryId::new();
        let w = EventWindows::new(d(2024, 4, 9), 1, 14, 7).unwrap();
        let records = vec![
            TransactionRecord::sale(w.baseline.start, p, 10.0, 1.0).with_category(food),
            TransactionRecord::sale(w.event.start, p, 30.0, 1.0).with_category(food),
            TransactionRecord::sale(w.baseline.start, p, 10.0, 1.0).with_category(other),
        ];
        let mut slugs = BTreeMap::new();
        slugs.insert(food, "food_beverages".to_string());
        let demand = DailyDemand::from_records(&records, DemandMetric::Quantity, &slugs);
        let a = analyze_occurrence(&demand, w, &["food_beverages".to_string(), "fashion".to_string()]).unwrap();
        assert_eq!(a.category_multipliers.len(), 1);
        assert!((a.category_multipliers["food_beverages"] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn three_occurrence_scenario() {
        let occ: Vec<_> = [1.40, 1.45, 1.50].into_iter().map(occurrence).collect();
        let agg = aggregate(&occ).unwrap();
        assert!((agg.during - 1.45).abs() < 1e-9);
        assert!((agg.variability_score - 0.9655).abs() < 1e-3);
        assert_eq!(agg.occurrences, 3);
        assert_eq!(agg.sample_size, 420);
        // t = 0.45 / (0.05 / sqrt 3) is far above 3.
        assert_eq!(agg.significance, 0.99);
    }

    #[test]
    fn trend_stability_defaults_below_three() {
        assert_eq!(trend_stability(&[1.2, 1.4]), 0.5);
    }

    #[test]
    fn significance_bounds() {
        assert_eq!(significance(&[1.3]), 0.1);
        assert_eq!(significance(&[1.0, 1.0, 1.0]), 0.1);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(confidence(10_000, 1.0, 1.0, 0.99, 10), 1.0);
        assert!(confidence(0, 0.0, 0.0, 0.1, 0) >= 0.5);
    }

    proptest! {
        #[test]
        fn aggregation_is_permutation_invariant(
            ms in prop::collection::vec(0.1f64..5.0, 1..8),
            seed in any::<u64>(),
        ) {
            let occ: Vec<_> = ms.iter().copied().map(occurrence).collect();
            let mut shuffled = occ.clone();
            // Deterministic rotation + reversal stands in for a shuffle.
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
            if seed % 2 == 0 {
                shuffled.reverse();
            }
            prop_assert_eq!(aggregate(&occ), aggregate(&shuffled));
        }

        #[test]
        fn confidence_non_decreasing_in_samples(
            a in 0u64..5_000,
            b in 0u64..5_000,
            v in 0.0f64..1.0,
            t in 0.0f64..1.0,
            s in 0.1f64..0.99,
            n in 0u32..6,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(confidence(lo, v, t, s, n) <= confidence(hi, v, t, s, n));
        }
    }
}
