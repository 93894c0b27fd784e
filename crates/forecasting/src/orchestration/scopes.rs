//! Data-driven scope analyzers.
//!
//! Each analyzer works on the extracted observations of one request and
//! returns a [`ScopeAnalysis`] or a `DataInsufficiency` error. Event-based
//! scopes (holidays, Ramadan) live in the orchestrator because they delegate
//! to the pattern learners.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};

use stockcast_core::{ForecastError, ForecastResult};

use crate::orchestration::types::{PatternScope, ScopeAnalysis};
use crate::stats;
use crate::timeseries::{Granularity, TimeSeriesObservation};

/// Indonesian rainy season months.
const RAINY_MONTHS: [u32; 5] = [11, 12, 1, 2, 3];

const SPIKE_Z: f64 = 2.5;

pub(crate) fn daily_totals(observations: &[TimeSeriesObservation]) -> BTreeMap<NaiveDate, f64> {
    let mut out = BTreeMap::new();
    for o in observations {
        *out.entry(o.date).or_insert(0.0) += o.value;
    }
    out
}

fn require(scope: PatternScope, required: usize, actual: usize) -> ForecastResult<()> {
    if actual < required {
        return Err(ForecastError::insufficient(scope.as_str(), required, actual));
    }
    Ok(())
}

fn overall_mean(days: &BTreeMap<NaiveDate, f64>) -> f64 {
    stats::mean(&days.values().copied().collect::<Vec<_>>())
}

fn relative(avg: f64, overall: f64) -> f64 {
    if overall.abs() <= f64::EPSILON { 1.0 } else { avg / overall }
}

/// Daily values grouped by `key`.
fn grouped<K: Ord + Copy>(days: &BTreeMap<NaiveDate, f64>, key: impl Fn(NaiveDate) -> K) -> BTreeMap<K, Vec<f64>> {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (d, v) in days {
        groups.entry(key(*d)).or_default().push(*v);
    }
    groups
}

/// Share of within-group spread; 1.0 means every group is perfectly stable.
fn stability(groups: &BTreeMap<impl Ord, Vec<f64>>) -> f64 {
    let cvs: Vec<f64> = groups
        .values()
        .filter(|g| g.len() >= 2)
        .map(|g| stats::coefficient_of_variation(g).abs())
        .collect();
    if cvs.is_empty() {
        return 0.5;
    }
    stats::clamp(1.0 - stats::mean(&cvs), 0.0, 1.0)
}

fn analysis(
    scope: PatternScope,
    confidence: f64,
    days: &BTreeMap<NaiveDate, f64>,
    multipliers: BTreeMap<String, f64>,
    summary: String,
) -> ScopeAnalysis {
    ScopeAnalysis {
        scope,
        confidence: stats::clamp(confidence, 0.0, 1.0),
        sample_size: days.len() as u64,
        multipliers,
        summary,
        latest_observation: days.keys().next_back().copied(),
    }
}

pub(crate) fn day_of_week(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::DayOfWeek;
    let days = daily_totals(observations);
    require(scope, 14, days.len())?;

    let overall = overall_mean(&days);
    let groups = grouped(&days, |d| d.weekday().num_days_from_monday());
    let multipliers: BTreeMap<String, f64> = groups
        .iter()
        .map(|(wd, vs)| (format!("weekday:{wd}"), relative(stats::mean(vs), overall)))
        .collect();

    let weeks = days.len() as f64 / 7.0;
    let confidence = 0.5 * (weeks / 8.0).min(1.0) + 0.45 * stability(&groups);
    let peak = multipliers
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, m)| format!("{k} peaks at {m:.2}x"))
        .unwrap_or_default();
    Ok(analysis(scope, confidence, &days, multipliers, format!("weekly cycle over {weeks:.1} weeks; {peak}")))
}

pub(crate) fn payday_cycle(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::PaydayCycle;
    let days = daily_totals(observations);
    let groups = grouped(&days, |d| d.day() >= 25 || d.day() <= 5);
    let payday = groups.get(&true).map(Vec::len).unwrap_or(0);
    let other = groups.get(&false).map(Vec::len).unwrap_or(0);
    require(scope, 5, payday.min(other))?;

    let overall = overall_mean(&days);
    let mut multipliers = BTreeMap::new();
    let payday_m = relative(groups.get(&true).map(|v| stats::mean(v)).unwrap_or(overall), overall);
    let other_m = relative(groups.get(&false).map(|v| stats::mean(v)).unwrap_or(overall), overall);
    multipliers.insert("payday:window".to_string(), payday_m);
    multipliers.insert("payday:mid_month".to_string(), other_m);

    let confidence = 0.4 + 0.35 * (days.len() as f64 / 120.0).min(1.0) + 0.2 * stability(&groups);
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("payday window runs at {payday_m:.2}x of the daily mean"),
    ))
}

pub(crate) fn monthly_seasonality(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::MonthlySeasonality;
    let days = daily_totals(observations);
    let groups = grouped(&days, |d| d.month());
    require(scope, 3, groups.len())?;

    let overall = overall_mean(&days);
    let multipliers: BTreeMap<String, f64> = groups
        .iter()
        .map(|(m, vs)| (format!("month:{m}"), relative(stats::mean(vs), overall)))
        .collect();
    let years = grouped(&days, |d| d.year()).len() as f64;
    let confidence = 0.3 + 0.4 * (groups.len() as f64 / 12.0) + 0.2 * (years / 2.0).min(1.0);
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("{} months covered across {years} year(s)", groups.len()),
    ))
}

pub(crate) fn trend(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::Trend;
    let mut weekly: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for o in observations {
        *weekly.entry(Granularity::Weekly.bucket(o.date)).or_insert(0.0) += o.value;
    }
    require(scope, 4, weekly.len())?;

    let ys: Vec<f64> = weekly.values().copied().collect();
    let (slope, intercept) = stats::linear_trend(&ys)
        .ok_or_else(|| ForecastError::computation("degenerate weekly series"))?;
    let mean = stats::mean(&ys);

    let ss_tot: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = ys
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();
    let r2 = if ss_tot <= f64::EPSILON { 0.0 } else { (1.0 - ss_res / ss_tot).max(0.0) };

    let growth = relative(mean + slope, mean);
    let mut multipliers = BTreeMap::new();
    multipliers.insert("trend:weekly_growth".to_string(), growth.max(0.0));

    let days = daily_totals(observations);
    let confidence = 0.4 + 0.45 * r2 + 0.1 * (ys.len() as f64 / 26.0).min(1.0);
    let direction = if slope >= 0.0 { "growing" } else { "declining" };
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("demand {direction} {:.1}% per week (r2 {r2:.2})", (growth - 1.0) * 100.0),
    ))
}

/// Second-half vs first-half daily average per category.
pub(crate) fn category_mix(
    observations: &[TimeSeriesObservation],
    slugs: &BTreeMap<stockcast_core::CategoryId, String>,
) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::CategoryMix;
    let days = daily_totals(observations);
    let (Some(first), Some(last)) = (days.keys().next().copied(), days.keys().next_back().copied()) else {
        return Err(ForecastError::insufficient(scope.as_str(), 1, 0));
    };
    let midpoint = first
        .checked_add_days(Days::new(((last - first).num_days() / 2) as u64))
        .unwrap_or(first);

    let mut halves: BTreeMap<String, (BTreeMap<NaiveDate, f64>, BTreeMap<NaiveDate, f64>)> = BTreeMap::new();
    for o in observations {
        let Some(cat) = o.category_id else { continue };
        let key = slugs.get(&cat).cloned().unwrap_or_else(|| cat.to_string());
        let entry = halves.entry(key).or_default();
        let half = if o.date <= midpoint { &mut entry.0 } else { &mut entry.1 };
        *half.entry(o.date).or_insert(0.0) += o.value;
    }

    let multipliers: BTreeMap<String, f64> = halves
        .iter()
        .filter(|(_, (a, b))| !a.is_empty() && !b.is_empty())
        .map(|(k, (a, b))| (format!("category:{k}"), relative(overall_mean(b), overall_mean(a))))
        .collect();
    require(scope, 1, multipliers.len())?;

    let coverage = observations.iter().filter(|o| o.category_id.is_some()).count() as f64 / observations.len() as f64;
    let confidence = 0.35 + 0.35 * coverage + 0.25 * (days.len() as f64 / 90.0).min(1.0);
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("{} categories compared across halves of the window", halves.len()),
    ))
}

/// Per-location daily average relative to the location mean.
pub(crate) fn regional(observations: &[TimeSeriesObservation], region: Option<&str>) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::Regional;
    let mut per_location: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for o in observations {
        let Some(loc) = o.location_id else { continue };
        *per_location.entry(loc.to_string()).or_default().entry(o.date).or_insert(0.0) += o.value;
    }
    require(scope, 2, per_location.len())?;

    let averages: BTreeMap<&String, f64> = per_location.iter().map(|(k, v)| (k, overall_mean(v))).collect();
    let mean = stats::mean(&averages.values().copied().collect::<Vec<_>>());
    let multipliers: BTreeMap<String, f64> = averages
        .iter()
        .map(|(k, avg)| (format!("location:{k}"), relative(*avg, mean)))
        .collect();

    let days = daily_totals(observations);
    let depth = per_location.values().map(|v| v.len()).min().unwrap_or(0) as f64;
    let confidence = 0.45 + 0.3 * (depth / 60.0).min(1.0) + 0.15 * (per_location.len() as f64 / 5.0).min(1.0);
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!(
            "{} locations compared{}",
            per_location.len(),
            region.map(|r| format!(" in {r}")).unwrap_or_default()
        ),
    ))
}

pub(crate) fn promotional_spikes(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::PromotionalSpikes;
    let days = daily_totals(observations);
    require(scope, 28, days.len())?;

    let values: Vec<f64> = days.values().copied().collect();
    let mean = stats::mean(&values);
    let sd = stats::stddev_sample(&values);
    let (spikes, normal): (Vec<f64>, Vec<f64>) = values
        .iter()
        .copied()
        .partition(|v| sd > f64::EPSILON && (v - mean) / sd > SPIKE_Z);

    let mut multipliers = BTreeMap::new();
    let lift = if spikes.is_empty() {
        1.0
    } else {
        relative(stats::mean(&spikes), stats::mean(&normal))
    };
    multipliers.insert("promo:spike_lift".to_string(), lift);
    multipliers.insert(
        "promo:spike_frequency".to_string(),
        1.0 + spikes.len() as f64 / values.len() as f64,
    );

    let confidence = if spikes.is_empty() {
        0.6
    } else {
        0.5 + 0.4 * (spikes.len() as f64 / 6.0).min(1.0)
    };
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("{} spike day(s), average lift {lift:.2}x", spikes.len()),
    ))
}

pub(crate) fn weather_season(observations: &[TimeSeriesObservation]) -> ForecastResult<ScopeAnalysis> {
    let scope = PatternScope::WeatherSeason;
    let days = daily_totals(observations);
    let groups = grouped(&days, |d| RAINY_MONTHS.contains(&d.month()));
    let rainy = groups.get(&true).map(Vec::len).unwrap_or(0);
    let dry = groups.get(&false).map(Vec::len).unwrap_or(0);
    require(scope, 14, rainy.min(dry))?;

    let overall = overall_mean(&days);
    let mut multipliers = BTreeMap::new();
    let rainy_m = relative(groups.get(&true).map(|v| stats::mean(v)).unwrap_or(overall), overall);
    multipliers.insert("season:rainy".to_string(), rainy_m);
    multipliers.insert(
        "season:dry".to_string(),
        relative(groups.get(&false).map(|v| stats::mean(v)).unwrap_or(overall), overall),
    );

    let confidence = 0.4 + 0.3 * (rainy.min(dry) as f64 / 90.0).min(1.0) + 0.2 * stability(&groups);
    Ok(analysis(
        scope,
        confidence,
        &days,
        multipliers,
        format!("rainy season runs at {rainy_m:.2}x of the daily mean"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockcast_core::{CategoryId, LocationId, ProductId};

    fn obs(date: NaiveDate, value: f64) -> TimeSeriesObservation {
        TimeSeriesObservation {
            date,
            product_id: ProductId::from_uuid(uuid::Uuid::nil()),
            value,
            location_id: None,
            category_id: None,
            metadata: Default::default(),
        }
    }

    fn series(start: NaiveDate, days: u64, f: impl Fn(NaiveDate) -> f64) -> Vec<TimeSeriesObservation> {
        (0..days)
            .map(|i| {
                let d = start + Days::new(i);
                obs(d, f(d))
            })
            .collect()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekend_lift_detected() {
        let o = series(d(2024, 1, 1), 56, |d| if d.weekday().num_days_from_monday() >= 5 { 150.0 } else { 100.0 });
        let a = day_of_week(&o).unwrap();
        let sat = a.multipliers["weekday:5"];
        let mon = a.multipliers["weekday:0"];
        assert!(sat > 1.2 && mon < 1.0);
        assert!(a.confidence > 0.8);
    }

    #[test]
    fn short_series_is_insufficient() {
        let o = series(d(2024, 1, 1), 5, |_| 10.0);
        let err = day_of_week(&o).unwrap_err();
        assert!(matches!(err, ForecastError::DataInsufficiency { .. }));
    }

    #[test]
    fn payday_window_multiplier() {
        let o = series(d(2024, 1, 1), 90, |d| if d.day() >= 25 || d.day() <= 5 { 130.0 } else { 100.0 });
        let a = payday_cycle(&o).unwrap();
        assert!(a.multipliers["payday:window"] > a.multipliers["payday:mid_month"]);
    }

    #[test]
    fn upward_trend() {
        let o = series(d(2024, 1, 1), 70, |d| 100.0 + (d - NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).num_days() as f64);
        let a = trend(&o).unwrap();
        assert!(a.multipliers["trend:weekly_growth"] > 1.0);
        assert!(a.summary.contains("growing"));
    }

    #[test]
    fn spikes_found() {
        let o = series(d(2024, 1, 1), 60, |d| if d.day() == 15 { 1_000.0 } else { 100.0 });
        let a = promotional_spikes(&o).unwrap();
        assert!(a.multipliers["promo:spike_lift"] > 5.0);
    }

    #[test]
    fn regional_needs_two_locations() {
        let (l1, l2) = (LocationId::new(), LocationId::new());
        let mut o = series(d(2024, 1, 1), 30, |_| 100.0);
        for x in o.iter_mut() {
            x.location_id = Some(l1);
        }
        assert!(regional(&o, None).is_err());
        let mut more = series(d(2024, 1, 1), 30, |_| 50.0);
        for x in more.iter_mut() {
            x.location_id = Some(l2);
        }
        o.extend(more);
        let a = regional(&o, Some("jakarta")).unwrap();
        assert!((a.multipliers[&format!("location:{l1}")] - 100.0 / 75.0).abs() < 1e-9);
    }

    #[test]
    fn category_growth_uses_slugs() {
        let c = CategoryId::new();
        let mut o = series(d(2024, 1, 1), 60, |d| if d.month() == 1 { 100.0 } else { 200.0 });
        for x in o.iter_mut() {
            x.category_id = Some(c);
        }
        let mut slugs = BTreeMap::new();
        slugs.insert(c, "fashion".to_string());
        let a = category_mix(&o, &slugs).unwrap();
        assert!(a.multipliers["category:fashion"] > 1.5);
    }

    #[test]
    fn rainy_and_dry_both_required() {
        let o = series(d(2024, 4, 1), 60, |_| 100.0);
        assert!(weather_season(&o).is_err());
        let o = series(d(2024, 2, 1), 90, |d| if d.month() <= 3 { 120.0 } else { 100.0 });
        assert!(weather_season(&o).unwrap().multipliers["season:rainy"] > 1.0);
    }
}
