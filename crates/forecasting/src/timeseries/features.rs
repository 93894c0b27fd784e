//! Feature derivation helpers.
//!
//! Feature names are stable strings; trained linear models reference them by name.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, Days, NaiveDate};

use crate::stats;
use crate::timeseries::types::{InventoryLevel, ProductAttributes, TimeSeriesObservation};

/// Calendar features for a single date.
pub fn temporal_features(date: NaiveDate) -> BTreeMap<String, f64> {
    let mut f = BTreeMap::new();
    let dow = date.weekday().num_days_from_monday() as f64;
    let day = date.day();
    let month = date.month();
    let days_in_month = days_in_month(date);

    f.insert("day_of_week".to_string(), dow);
    f.insert("day_of_month".to_string(), day as f64);
    f.insert("month".to_string(), month as f64);
    f.insert("quarter".to_string(), ((month - 1) / 3 + 1) as f64);
    f.insert("week_of_year".to_string(), date.iso_week().week() as f64);
    f.insert("is_weekend".to_string(), flag(dow >= 5.0));
    f.insert("is_month_start".to_string(), flag(day <= 5));
    f.insert("is_month_end".to_string(), flag(day + 2 >= days_in_month));
    // Indonesian payday window: the 25th through the 5th.
    f.insert("is_payday_week".to_string(), flag(day >= 25 || day <= 5));
    f.insert("is_quarter_end".to_string(), flag(month % 3 == 0 && day >= 25));
    f.insert("is_year_end".to_string(), flag(month == 12 && day >= 20));
    f.insert("sin_weekly".to_string(), (2.0 * PI * dow / 7.0).sin());
    f.insert("cos_weekly".to_string(), (2.0 * PI * dow / 7.0).cos());
    f
}

/// Static product attributes.
pub fn static_features(attrs: &ProductAttributes) -> BTreeMap<String, f64> {
    let mut f = BTreeMap::new();
    f.insert("unit_price".to_string(), attrs.unit_price);
    f.insert("cost_price".to_string(), attrs.cost_price);
    f.insert("margin".to_string(), attrs.unit_price - attrs.cost_price);
    if let Some(lead) = attrs.lead_time_days {
        f.insert("lead_time_days".to_string(), lead as f64);
    }
    if let Some(shelf) = attrs.shelf_life_days {
        f.insert("shelf_life_days".to_string(), shelf as f64);
    }
    f
}

/// Inventory aggregates across locations.
pub fn inventory_features(levels: &[InventoryLevel]) -> BTreeMap<String, f64> {
    let mut f = BTreeMap::new();
    let total: f64 = levels.iter().map(|l| l.quantity).sum();
    let count = levels.len();
    f.insert("total_quantity".to_string(), total);
    f.insert(
        "avg_quantity".to_string(),
        if count == 0 { 0.0 } else { total / count as f64 },
    );
    f.insert("location_count".to_string(), count as f64);
    f
}

/// Lag and rolling-window features computed from observations strictly before `date`.
///
/// `history` must belong to one product. Values are summed per day (across
/// locations) and days without sales count as zero demand, so `lag_n` is the
/// demand exactly `n` days before `date`. Nothing before the first observed
/// day is assumed.
pub fn history_features(history: &[TimeSeriesObservation], date: NaiveDate) -> BTreeMap<String, f64> {
    let mut f = BTreeMap::new();
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for o in history.iter().filter(|o| o.date < date) {
        *daily.entry(o.date).or_insert(0.0) += o.value;
    }
    let Some(&first) = daily.keys().next() else {
        return f;
    };

    let span = (date - first).num_days();
    let back = |n: i64| date.checked_sub_days(Days::new(n as u64));
    let value_on = |n: i64| back(n).map(|day| daily.get(&day).copied().unwrap_or(0.0));
    let window = |len: i64| -> Vec<f64> { (1..=len.min(span)).filter_map(&value_on).collect() };

    if let Some(v) = value_on(1) {
        f.insert("lag_1".to_string(), v);
    }
    if span >= 7 {
        if let Some(v) = value_on(7) {
            f.insert("lag_7".to_string(), v);
        }
    }
    let last7 = window(7);
    let last30 = window(30);
    f.insert("rolling_mean_7".to_string(), stats::mean(&last7));
    f.insert("rolling_std_7".to_string(), stats::stddev_sample(&last7));
    f.insert("rolling_mean_30".to_string(), stats::mean(&last30));
    f
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first_next| first_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockcast_core::{LocationId, ProductId};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn saturday_month_end_flags() {
        // 2024-08-31 is a Saturday.
        let f = temporal_features(d(2024, 8, 31));
        assert_eq!(f["is_weekend"], 1.0);
        assert_eq!(f["is_month_end"], 1.0);
        assert_eq!(f["quarter"], 3.0);
        assert_eq!(f["is_payday_week"], 1.0);
    }

    #[test]
    fn leap_february_month_end() {
        assert_eq!(temporal_features(d(2024, 2, 27))["is_month_end"], 1.0);
        assert_eq!(temporal_features(d(2024, 2, 26))["is_month_end"], 0.0);
    }

    #[test]
    fn inventory_aggregates() {
        let levels = vec![
            InventoryLevel { location_id: LocationId::new(), quantity: 10.0 },
            InventoryLevel { location_id: LocationId::new(), quantity: 30.0 },
        ];
        let f = inventory_features(&levels);
        assert_eq!(f["total_quantity"], 40.0);
        assert_eq!(f["avg_quantity"], 20.0);
        assert_eq!(f["location_count"], 2.0);
        assert_eq!(inventory_features(&[])["avg_quantity"], 0.0);
    }

    #[test]
    fn history_features_ignore_same_day_and_later() {
        let p = ProductId::new();
        let history: Vec<TimeSeriesObservation> = (1..=10)
            .map(|i| TimeSeriesObservation {
                date: d(2024, 1, i),
                product_id: p,
                value: i as f64,
                location_id: None,
                category_id: None,
                metadata: Default::default(),
            })
            .collect();
        let f = history_features(&history, d(2024, 1, 9));
        assert_eq!(f["lag_1"], 8.0);
        assert_eq!(f["lag_7"], 2.0);
        assert_eq!(f["rolling_mean_7"], 5.0);
    }

    fn obs(p: ProductId, date: NaiveDate, value: f64, location: Option<LocationId>) -> TimeSeriesObservation {
        TimeSeriesObservation {
            date,
            product_id: p,
            value,
            location_id: location,
            category_id: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn sparse_history_counts_missing_days_as_zero() {
        let p = ProductId::new();
        let history = vec![
            obs(p, d(2024, 1, 1), 10.0, None),
            obs(p, d(2024, 1, 3), 20.0, None),
            obs(p, d(2024, 1, 8), 40.0, None),
        ];
        // Days 2..8 of January: 0, 20, 0, 0, 0, 0, 40.
        let f = history_features(&history, d(2024, 1, 10));
        assert_eq!(f["lag_1"], 0.0);
        assert_eq!(f["lag_7"], 20.0);
        assert!((f["rolling_mean_7"] - 60.0 / 7.0).abs() < 1e-9);
        // Only nine days exist since the first observation.
        assert!((f["rolling_mean_30"] - 70.0 / 9.0).abs() < 1e-9);

        let short = history_features(&history, d(2024, 1, 4));
        assert_eq!(short["lag_1"], 20.0);
        assert!(!short.contains_key("lag_7"));
    }

    #[test]
    fn locations_on_one_day_are_summed() {
        let p = ProductId::new();
        let (a, b) = (LocationId::new(), LocationId::new());
        let history = vec![
            obs(p, d(2024, 1, 1), 1.0, Some(a)),
            obs(p, d(2024, 1, 1), 2.0, Some(b)),
            obs(p, d(2024, 1, 2), 5.0, Some(a)),
            obs(p, d(2024, 1, 2), 7.0, Some(b)),
        ];
        let f = history_features(&history, d(2024, 1, 3));
        assert_eq!(f["lag_1"], 12.0);
        assert_eq!(f["rolling_mean_7"], 7.5);
        assert!(!f.contains_key("lag_7"));
    }
}
