//! Ramadan/Lebaran phase learner.
//!
//! Learns one multiplier per Ramadan week plus the pre-Lebaran week and the
//! Lebaran holiday itself, using the same baseline machinery as the general
//! learner. Consulted before the general catalogue on lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stockcast_core::{ForecastResult, TenantId};

use crate::config::LearnerConfig;
use crate::patterns::analysis::{self, DailyDemand};
use crate::patterns::calendar::{DateWindow, LunarAnchor};
use crate::patterns::types::{DynamicMultiplier, MultiplierSource, PatternLearningRequest, PatternScopeKey};
use crate::ports::{CacheStore, TransactionSource, cache_get, cache_set};
use crate::timeseries::TransactionQuery;

/// A learner that owns a subset of catalogued events.
#[async_trait]
pub trait SpecializedLearner: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the catalogue event `event_name` is delegated to this learner.
    fn handles(&self, event_name: &str) -> bool;

    async fn learn(&self, tenant_id: TenantId, request: &PatternLearningRequest) -> ForecastResult<usize>;

    /// `Ok(None)` when the date is outside this learner's events or nothing is learned.
    async fn lookup(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        scope: &PatternScopeKey,
        category: Option<&str>,
    ) -> ForecastResult<Option<DynamicMultiplier>>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamadanPhase {
    Week1,
    Week2,
    Week3,
    Week4,
    PreLebaran,
    Lebaran,
}

impl RamadanPhase {
    pub const ALL: [RamadanPhase; 6] = [
        RamadanPhase::Week1,
        RamadanPhase::Week2,
        RamadanPhase::Week3,
        RamadanPhase::Week4,
        RamadanPhase::PreLebaran,
        RamadanPhase::Lebaran,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RamadanPhase::Week1 => "ramadan_week_1",
            RamadanPhase::Week2 => "ramadan_week_2",
            RamadanPhase::Week3 => "ramadan_week_3",
            RamadanPhase::Week4 => "ramadan_week_4",
            RamadanPhase::PreLebaran => "pre_lebaran",
            RamadanPhase::Lebaran => "lebaran",
        }
    }

    /// Phase window in `year`.
    ///
    /// Week 4 runs to the eve of Eid; the pre-Lebaran week overlaps it and the
    /// Lebaran window starts on the eve, so lookups test phases latest first.
    pub fn window(&self, year: i32) -> Option<DateWindow> {
        let start = LunarAnchor::RamadanStart.date_in(year)?;
        let eid = LunarAnchor::EidAlFitr.date_in(year)?;
        let week = |k: u64| -> Option<DateWindow> {
            let s = start.checked_add_days(Days::new(7 * k))?;
            Some(DateWindow {
                start: s,
                end: s.checked_add_days(Days::new(6))?,
            })
        };
        match self {
            RamadanPhase::Week1 => week(0),
            RamadanPhase::Week2 => week(1),
            RamadanPhase::Week3 => week(2),
            RamadanPhase::Week4 => Some(DateWindow {
                start: start.checked_add_days(Days::new(21))?,
                end: eid.pred_opt()?,
            }),
            RamadanPhase::PreLebaran => Some(DateWindow {
                start: eid.checked_sub_days(Days::new(7))?,
                end: eid.pred_opt()?,
            }),
            RamadanPhase::Lebaran => Some(DateWindow {
                start: eid.pred_opt()?,
                end: eid.checked_add_days(Days::new(5))?,
            }),
        }
    }

    pub fn for_date(date: NaiveDate) -> Option<RamadanPhase> {
        RamadanPhase::ALL
            .iter()
            .rev()
            .copied()
            .find(|p| p.window(date.year()).is_some_and(|w| w.contains(date)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEffect {
    pub multiplier: f64,
    pub confidence: f64,
    pub occurrences: u32,
    pub category_multipliers: BTreeMap<String, f64>,
}

/// Learned per-phase multipliers for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamadanPattern {
    pub scope: PatternScopeKey,
    pub phases: BTreeMap<RamadanPhase, PhaseEffect>,
    pub learned_at: DateTime<Utc>,
}

pub struct RamadanPatternLearner {
    transactions: Arc<dyn TransactionSource>,
    cache: Arc<dyn CacheStore>,
    config: LearnerConfig,
    categories: Vec<String>,
}

impl RamadanPatternLearner {
    pub fn new(transactions: Arc<dyn TransactionSource>, cache: Arc<dyn CacheStore>, config: LearnerConfig) -> Self {
        Self {
            transactions,
            cache,
            config,
            categories: vec![
                "food_beverages".to_string(),
                "fashion".to_string(),
                "household".to_string(),
                "gifts".to_string(),
            ],
        }
    }

    pub fn cache_key(tenant_id: TenantId, scope: &PatternScopeKey) -> String {
        format!(
            "pattern:{tenant_id}:{}:{}:ramadan_phases",
            scope.business_type,
            scope.region_key()
        )
    }

    /// Learn and cache phase effects; returns the learned pattern.
    pub async fn learn_phases(
        &self,
        tenant_id: TenantId,
        request: &PatternLearningRequest,
    ) -> ForecastResult<RamadanPattern> {
        let scope = request.scope();
        let lookback = request.lookback_years.unwrap_or(self.config.lookback_years);
        let reference = request.reference_date;
        let earliest = reference
            .checked_sub_months(Months::new(12 * lookback))
            .unwrap_or(NaiveDate::MIN);

        // (phase, event window, baseline window) for every complete occurrence.
        let mut windows: Vec<(RamadanPhase, DateWindow, DateWindow)> = Vec::new();
        for year in earliest.year()..=reference.year() {
            for phase in RamadanPhase::ALL {
                let Some(w) = phase.window(year) else { continue };
                if w.start < earliest || w.end > reference {
                    continue;
                }
                let Some(baseline) = shift_year_back(w) else { continue };
                windows.push((phase, w, baseline));
            }
        }

        let mut pattern = RamadanPattern {
            scope: scope.clone(),
            phases: BTreeMap::new(),
            learned_at: Utc::now(),
        };
        let Some(start) = windows.iter().map(|(_, _, b)| b.start).min() else {
            return Ok(pattern);
        };
        let end = windows.iter().map(|(_, w, _)| w.end).max().unwrap_or(reference);

        let records = self
            .transactions
            .fetch_transactions(tenant_id, &TransactionQuery::between(start, end))
            .await?;
        let demand = DailyDemand::from_records(&records, request.metric, &request.category_slugs);

        let mut per_phase: BTreeMap<RamadanPhase, Vec<(f64, u64, BTreeMap<String, f64>)>> = BTreeMap::new();
        for (phase, w, baseline) in windows {
            let base = demand.window(baseline);
            if base.is_empty() {
                continue;
            }
            let during = demand.window(w);
            let mut cats = BTreeMap::new();
            for slug in &self.categories {
                let cb = demand.category_window(slug, baseline);
                if !cb.is_empty() {
                    cats.insert(slug.clone(), analysis::ratio(&demand.category_window(slug, w), &cb));
                }
            }
            per_phase.entry(phase).or_default().push((
                analysis::ratio(&during, &base),
                base.samples + during.samples,
                cats,
            ));
        }

        for (phase, samples) in per_phase {
            let mut multipliers: Vec<f64> = samples.iter().map(|(m, _, _)| *m).collect();
            multipliers.sort_by(f64::total_cmp);
            let sample_size: u64 = samples.iter().map(|(_, n, _)| n).sum();
            let occurrences = samples.len() as u32;

            let multiplier = analysis::positive_mean(&multipliers);

            let mut cat_values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for (_, _, cats) in &samples {
                for (slug, m) in cats {
                    cat_values.entry(slug.clone()).or_default().push(*m);
                }
            }

            let confidence = analysis::confidence(
                sample_size,
                analysis::variability_score(&multipliers),
                analysis::trend_stability(&multipliers),
                analysis::significance(&multipliers),
                occurrences,
            );
            if confidence < request.confidence_threshold.unwrap_or(self.config.confidence_threshold) {
                debug!(tenant = %tenant_id, phase = phase.label(), confidence, "phase below threshold");
                continue;
            }

            pattern.phases.insert(
                phase,
                PhaseEffect {
                    multiplier,
                    confidence,
                    occurrences,
                    category_multipliers: cat_values
                        .into_iter()
                        .map(|(slug, ms)| (slug, analysis::positive_mean(&ms)))
                        .collect(),
                },
            );
        }

        cache_set(
            self.cache.as_ref(),
            &Self::cache_key(tenant_id, &scope),
            &pattern,
            self.config.effect_cache_ttl,
        )
        .await;
        info!(tenant = %tenant_id, phases = pattern.phases.len(), "ramadan phases learned");
        Ok(pattern)
    }
}

#[async_trait]
impl SpecializedLearner for RamadanPatternLearner {
    fn name(&self) -> &str {
        "ramadan"
    }

    fn handles(&self, event_name: &str) -> bool {
        matches!(event_name, "ramadan" | "lebaran")
    }

    async fn learn(&self, tenant_id: TenantId, request: &PatternLearningRequest) -> ForecastResult<usize> {
        Ok(self.learn_phases(tenant_id, request).await?.phases.len())
    }

    async fn lookup(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        scope: &PatternScopeKey,
        category: Option<&str>,
    ) -> ForecastResult<Option<DynamicMultiplier>> {
        let Some(phase) = RamadanPhase::for_date(date) else {
            return Ok(None);
        };

        let mut pattern = cache_get::<RamadanPattern>(self.cache.as_ref(), &Self::cache_key(tenant_id, scope)).await;
        if pattern.is_none() && scope.region.is_some() {
            let global = PatternScopeKey::new(scope.business_type, None);
            pattern = cache_get(self.cache.as_ref(), &Self::cache_key(tenant_id, &global)).await;
        }
        let Some(effect) = pattern.and_then(|p| p.phases.get(&phase).cloned()) else {
            return Ok(None);
        };

        let by_category = category.and_then(|c| effect.category_multipliers.get(c).map(|m| (c, *m)));
        Ok(Some(match by_category {
            Some((c, m)) => DynamicMultiplier {
                multiplier: m,
                confidence: effect.confidence,
                source: MultiplierSource::Category {
                    event_name: phase.label().to_string(),
                    category: c.to_string(),
                },
            },
            None => DynamicMultiplier {
                multiplier: effect.multiplier,
                confidence: effect.confidence,
                source: MultiplierSource::Specialized {
                    label: phase.label().to_string(),
                },
            },
        }))
    }
}

fn shift_year_back(w: DateWindow) -> Option<DateWindow> {
    Some(DateWindow {
        start: w.start.checked_sub_months(Months::new(12))?,
        end: w.end.checked_sub_months(Months::new(12))?,
    })
}
