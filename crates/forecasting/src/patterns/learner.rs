use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use stockcast_core::{ForecastError, ForecastResult, TenantId};
use stockcast_events::{Notification, NotificationKind, NotificationSink};

use crate::config::LearnerConfig;
use crate::patterns::analysis::{self, DailyDemand, OccurrenceAnalysis};
use crate::patterns::calendar::{CalendarEvent, EventCatalogue, EventWindows};
use crate::patterns::ramadan::SpecializedLearner;
use crate::patterns::run::{RunKind, RunRecord, RunState, RunStore};
use crate::patterns::types::{
    BusinessType, DynamicMultiplier, MultiplierSource, PatternEffect, PatternLearningRequest,
    PatternLearningResult, PatternScopeKey, Provenance, SeasonalBreakdown, SkipReason, SkippedEvent,
};
use crate::ports::{CacheStore, TransactionSource, cache_get, cache_set};
use crate::stats;
use crate::timeseries::TransactionQuery;

/// Cache key of one learned effect.
pub fn effect_cache_key(tenant_id: TenantId, scope: &PatternScopeKey, event_name: &str) -> String {
    format!(
        "pattern:{tenant_id}:{}:{}:{event_name}",
        scope.business_type,
        scope.region_key()
    )
}

/// Learns calendar-event demand multipliers from transaction history.
#[derive(Clone)]
pub struct PatternLearner {
    transactions: Arc<dyn TransactionSource>,
    cache: Arc<dyn CacheStore>,
    runs: Arc<dyn RunStore>,
    notifier: Arc<dyn NotificationSink>,
    catalogue: EventCatalogue,
    specialized: Option<Arc<dyn SpecializedLearner>>,
    config: LearnerConfig,
}

struct Planned<'a> {
    event: &'a CalendarEvent,
    windows: Vec<EventWindows>,
}

impl PatternLearner {
    pub fn new(
        transactions: Arc<dyn TransactionSource>,
        cache: Arc<dyn CacheStore>,
        runs: Arc<dyn RunStore>,
        notifier: Arc<dyn NotificationSink>,
        config: LearnerConfig,
    ) -> Self {
        Self {
            transactions,
            cache,
            runs,
            notifier,
            catalogue: EventCatalogue::default(),
            specialized: None,
            config,
        }
    }

    pub fn with_catalogue(mut self, catalogue: EventCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn with_specialized(mut self, learner: Arc<dyn SpecializedLearner>) -> Self {
        self.specialized = Some(learner);
        self
    }

    pub fn catalogue(&self) -> &EventCatalogue {
        &self.catalogue
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Run one learning pass.
    ///
    /// Only validation errors are returned as `Err`; every other failure ends
    /// the run in `FAILED` and is reported through the result.
    pub async fn learn(
        &self,
        tenant_id: TenantId,
        request: &PatternLearningRequest,
    ) -> ForecastResult<PatternLearningResult> {
        request.validate()?;

        let started_at = Utc::now();
        let mut record = RunRecord::new(tenant_id, RunKind::PatternLearning);
        self.persist(&record);
        info!(tenant = %tenant_id, run = %record.run_id, business_type = %request.business_type, "pattern learning started");

        match self.run(tenant_id, request, &mut record).await {
            Ok((effects, skipped)) => {
                self.notifier.notify(Notification::new(
                    tenant_id,
                    NotificationKind::PatternLearningCompleted,
                    json!({
                        "run_id": record.run_id,
                        "effects": effects.len(),
                        "skipped": skipped.len(),
                    }),
                ));
                info!(tenant = %tenant_id, run = %record.run_id, effects = effects.len(), skipped = skipped.len(), "pattern learning completed");
                Ok(PatternLearningResult {
                    run_id: record.run_id,
                    success: true,
                    state: record.state,
                    effects,
                    skipped,
                    error: None,
                    started_at,
                    completed_at: Utc::now(),
                })
            }
            Err(e) => {
                record.fail(e.to_string());
                self.persist(&record);
                self.notifier.notify(Notification::new(
                    tenant_id,
                    NotificationKind::PatternLearningFailed,
                    json!({
                        "run_id": record.run_id,
                        "error": e.to_string(),
                        "kind": e.kind(),
                    }),
                ));
                warn!(tenant = %tenant_id, run = %record.run_id, error = %e, "pattern learning failed");
                Ok(PatternLearningResult {
                    run_id: record.run_id,
                    success: false,
                    state: record.state,
                    effects: Vec::new(),
                    skipped: Vec::new(),
                    error: Some(e.to_string()),
                    started_at,
                    completed_at: Utc::now(),
                })
            }
        }
    }

    async fn run(
        &self,
        tenant_id: TenantId,
        request: &PatternLearningRequest,
        record: &mut RunRecord,
    ) -> ForecastResult<(Vec<PatternEffect>, Vec<SkippedEvent>)> {
        let scope = request.scope();
        let lookback = request.lookback_years.unwrap_or(self.config.lookback_years);
        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold);

        self.transition(record, RunState::CollectingData)?;
        let mut skipped = Vec::new();
        let plan = self.plan(request, lookback, &mut skipped);

        let span = plan
            .iter()
            .flat_map(|p| p.windows.iter())
            .fold(None, |acc: Option<(NaiveDate, NaiveDate)>, w| {
                let lo = w.baseline.start;
                let hi = w.span_end();
                Some(match acc {
                    Some((a, b)) => (a.min(lo), b.max(hi)),
                    None => (lo, hi),
                })
            });

        let demand = match span {
            Some((start, end)) => {
                let records = self
                    .transactions
                    .fetch_transactions(tenant_id, &TransactionQuery::between(start, end))
                    .await?;
                debug!(tenant = %tenant_id, records = records.len(), %start, %end, "collected transactions");
                DailyDemand::from_records(&records, request.metric, &request.category_slugs)
            }
            None => DailyDemand::default(),
        };

        self.transition(record, RunState::AnalyzingPeriods)?;
        let mut analysed: Vec<(&CalendarEvent, Vec<OccurrenceAnalysis>)> = Vec::new();
        for p in &plan {
            let occurrences: Vec<OccurrenceAnalysis> = p
                .windows
                .iter()
                .filter_map(|w| analysis::analyze_occurrence(&demand, *w, &p.event.affected_categories))
                .collect();
            if occurrences.is_empty() {
                let err = ForecastError::insufficient(p.event.name.clone(), 1, 0);
                debug!(tenant = %tenant_id, event = %p.event.name, "no usable occurrences");
                skipped.push(SkippedEvent {
                    event_name: p.event.name.clone(),
                    reason: SkipReason::InsufficientData { detail: err.to_string() },
                });
                continue;
            }
            analysed.push((p.event, occurrences));
        }

        self.transition(record, RunState::Aggregating)?;
        let aggregated: Vec<_> = analysed
            .iter()
            .filter_map(|(event, occ)| analysis::aggregate(occ).map(|agg| (*event, occ, agg)))
            .collect();

        self.transition(record, RunState::ScoringConfidence)?;
        let now = Utc::now();
        let mut effects = Vec::new();
        for (event, occ, agg) in aggregated {
            let confidence = agg.confidence();
            if confidence < threshold {
                debug!(tenant = %tenant_id, event = %event.name, confidence, threshold, "effect below threshold");
                skipped.push(SkippedEvent {
                    event_name: event.name.clone(),
                    reason: SkipReason::BelowConfidenceThreshold { confidence, threshold },
                });
                continue;
            }

            let effect = PatternEffect {
                event_name: event.name.clone(),
                scope: scope.clone(),
                multiplier: agg.during,
                confidence,
                sample_size: agg.sample_size,
                occurrences: agg.occurrences,
                seasonal_breakdown: SeasonalBreakdown {
                    pre: agg.pre,
                    during: agg.during,
                    post: agg.post,
                },
                category_multipliers: agg.category_multipliers.clone(),
                windows: occ.iter().map(|o| (o.windows.event.start, o.windows.event.end)).collect(),
                provenance: Provenance {
                    data_points: agg.sample_size,
                    last_updated: now,
                    significance: agg.significance,
                    variability_score: agg.variability_score,
                    trend_stability: agg.trend_stability,
                },
            };
            cache_set(
                self.cache.as_ref(),
                &effect_cache_key(tenant_id, &scope, &effect.event_name),
                &effect,
                self.config.effect_cache_ttl,
            )
            .await;
            effects.push(effect);
        }

        if let Some(specialized) = &self.specialized {
            let wanted = plan.iter().any(|p| specialized.handles(&p.event.name));
            if wanted {
                if let Err(e) = specialized.learn(tenant_id, request).await {
                    warn!(tenant = %tenant_id, learner = specialized.name(), error = %e, "specialized learning failed");
                }
            }
        }

        self.transition(record, RunState::Done)?;
        Ok((effects, skipped))
    }

    fn plan<'a>(
        &'a self,
        request: &PatternLearningRequest,
        lookback_years: u32,
        skipped: &mut Vec<SkippedEvent>,
    ) -> Vec<Planned<'a>> {
        let region = request.scope().region;
        let candidates: Vec<&CalendarEvent> = match &request.events {
            Some(names) => names
                .iter()
                .filter_map(|name| match self.catalogue.get(name) {
                    Some(e) => Some(e),
                    None => {
                        skipped.push(SkippedEvent {
                            event_name: name.clone(),
                            reason: SkipReason::UnknownEvent,
                        });
                        None
                    }
                })
                .collect(),
            None => self.catalogue.events().iter().collect(),
        };

        let reference = request.reference_date;
        let earliest = reference
            .checked_sub_months(Months::new(12 * lookback_years))
            .unwrap_or(NaiveDate::MIN);

        let mut plan = Vec::new();
        for event in candidates {
            if !event.applies_to(request.business_type, region.as_deref()) {
                skipped.push(SkippedEvent {
                    event_name: event.name.clone(),
                    reason: SkipReason::NotApplicable,
                });
                continue;
            }
            let windows: Vec<EventWindows> = event
                .occurrences(
                    earliest.year(),
                    reference.year(),
                    self.config.pre_event_days,
                    self.config.post_event_days,
                )
                .into_iter()
                .filter(|w| w.event.start >= earliest && w.event.end <= reference)
                .collect();
            plan.push(Planned { event, windows });
        }
        plan
    }

    /// Delegated events answered by the attached specialized learner.
    ///
    /// Without one, delegated events are looked up like any other.
    fn defers(&self, event: &CalendarEvent) -> bool {
        event.delegated && self.specialized.as_ref().is_some_and(|s| s.handles(&event.name))
    }

    /// Demand multiplier for `date`. Never fails.
    ///
    /// The specialized learner is consulted first; the general catalogue
    /// skips events delegated to it.
    pub async fn dynamic_multiplier(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        business_type: BusinessType,
        category: Option<&str>,
        region: Option<&str>,
    ) -> DynamicMultiplier {
        match self.lookup(tenant_id, date, business_type, category, region).await {
            Ok(m) => DynamicMultiplier {
                multiplier: m.multiplier.max(0.0),
                confidence: stats::clamp(m.confidence, 0.0, 1.0),
                source: m.source,
            },
            Err(e) => {
                warn!(tenant = %tenant_id, %date, error = %e, "multiplier lookup failed; using fallback");
                DynamicMultiplier::fallback()
            }
        }
    }

    async fn lookup(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        business_type: BusinessType,
        category: Option<&str>,
        region: Option<&str>,
    ) -> ForecastResult<DynamicMultiplier> {
        let scope = PatternScopeKey::new(business_type, region.map(str::to_string));

        if let Some(specialized) = &self.specialized {
            if let Some(m) = specialized.lookup(tenant_id, date, &scope, category).await? {
                return Ok(m);
            }
        }

        let mut best: Option<DynamicMultiplier> = None;
        for event in self.catalogue.events() {
            if self.defers(event) || !event.applies_to(business_type, scope.region.as_deref()) {
                continue;
            }
            let in_window = event
                .occurrences(date.year() - 1, date.year(), 0, 0)
                .iter()
                .any(|w| w.event.contains(date));
            if !in_window {
                continue;
            }
            let Some(effect) = self.cached_effect(tenant_id, &scope, &event.name).await else {
                continue;
            };

            let candidate = match category.and_then(|c| effect.category_multipliers.get(c).map(|m| (c, *m))) {
                Some((c, m)) => DynamicMultiplier {
                    multiplier: m,
                    confidence: effect.confidence,
                    source: MultiplierSource::Category {
                        event_name: effect.event_name.clone(),
                        category: c.to_string(),
                    },
                },
                None => DynamicMultiplier {
                    multiplier: effect.multiplier,
                    confidence: effect.confidence,
                    source: MultiplierSource::Event {
                        event_name: effect.event_name.clone(),
                    },
                },
            };

            let better = match &best {
                None => true,
                Some(b) => (candidate.specificity(), candidate.confidence) > (b.specificity(), b.confidence),
            };
            if better {
                best = Some(candidate);
            }
        }

        Ok(best.unwrap_or_else(DynamicMultiplier::neutral))
    }

    /// Region-specific effect first, then the region-agnostic one.
    async fn cached_effect(
        &self,
        tenant_id: TenantId,
        scope: &PatternScopeKey,
        event_name: &str,
    ) -> Option<PatternEffect> {
        let hit = cache_get::<PatternEffect>(self.cache.as_ref(), &effect_cache_key(tenant_id, scope, event_name)).await;
        if hit.is_some() || scope.region.is_none() {
            return hit;
        }
        let global = PatternScopeKey::new(scope.business_type, None);
        cache_get(self.cache.as_ref(), &effect_cache_key(tenant_id, &global, event_name)).await
    }

    /// Learned effects currently cached for a scope, keyed by event.
    pub async fn cached_effects(&self, tenant_id: TenantId, scope: &PatternScopeKey) -> BTreeMap<String, PatternEffect> {
        let mut out = BTreeMap::new();
        for event in self.catalogue.events() {
            if let Some(e) = self.cached_effect(tenant_id, scope, &event.name).await {
                out.insert(event.name.clone(), e);
            }
        }
        out
    }

    fn transition(&self, record: &mut RunRecord, next: RunState) -> ForecastResult<()> {
        record.advance(next)?;
        self.persist(record);
        Ok(())
    }

    fn persist(&self, record: &RunRecord) {
        if let Err(e) = self.runs.save(record) {
            warn!(tenant = %record.tenant_id, run = %record.run_id, error = %e, "failed to persist run state");
        }
    }
}
