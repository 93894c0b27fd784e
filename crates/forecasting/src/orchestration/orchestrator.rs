use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stockcast_core::{CategoryId, ErrorKind, ForecastError, ForecastResult, LocationId, ProductId, TenantId};
use stockcast_events::{Notification, NotificationKind, NotificationSink};

use crate::config::OrchestratorConfig;
use crate::orchestration::integration;
use crate::orchestration::scopes;
use crate::orchestration::types::{
    FailedScope, PatternAnalysisRequest, PatternAnalysisResult, PatternScope, ScopeAnalysis,
};
use crate::patterns::{
    BusinessType, PatternLearner, PatternLearningRequest, PatternScopeKey, RamadanPattern, RamadanPatternLearner,
    SpecializedLearner,
};
use crate::ports::{CacheStore, cache_get, cache_set, signature_key};
use crate::stats;
use crate::timeseries::{DemandMetric, TimeSeriesExtractor, TimeSeriesObservation};
use crate::validation::{CrossPatternValidator, PatternEvidence, PatternSet, ValidationRequest};

/// Fields that determine a scope analysis; strategy and conflict handling do not.
#[derive(Serialize)]
struct ScopeSignature<'a> {
    business_type: BusinessType,
    region: Option<&'a str>,
    start: NaiveDate,
    end: NaiveDate,
    product_ids: &'a [ProductId],
    category_id: Option<CategoryId>,
    location_id: Option<LocationId>,
    metric: DemandMetric,
    category_slugs: &'a BTreeMap<CategoryId, String>,
}

type Observations = Result<Arc<Vec<TimeSeriesObservation>>, ForecastError>;

/// Runs pattern scopes concurrently and merges them into one result.
#[derive(Clone)]
pub struct PatternOrchestrator {
    extractor: TimeSeriesExtractor,
    learner: PatternLearner,
    ramadan: Option<Arc<RamadanPatternLearner>>,
    validator: CrossPatternValidator,
    cache: Arc<dyn CacheStore>,
    notifier: Arc<dyn NotificationSink>,
    config: OrchestratorConfig,
}

impl PatternOrchestrator {
    pub fn new(
        extractor: TimeSeriesExtractor,
        learner: PatternLearner,
        cache: Arc<dyn CacheStore>,
        notifier: Arc<dyn NotificationSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            extractor,
            learner,
            ramadan: None,
            validator: CrossPatternValidator::new(),
            cache,
            notifier,
            config,
        }
    }

    pub fn with_ramadan(mut self, ramadan: Arc<RamadanPatternLearner>) -> Self {
        self.ramadan = Some(ramadan);
        self
    }

    /// Run every requested scope and integrate the survivors.
    ///
    /// Returns `Err` only for an invalid request. A result with
    /// `success = false` means every scope failed; such results are never cached.
    pub async fn integrate(
        &self,
        tenant_id: TenantId,
        request: &PatternAnalysisRequest,
    ) -> ForecastResult<PatternAnalysisResult> {
        request.validate(self.config.max_scopes)?;
        let request = Arc::new(request.normalized());

        let signature = signature_key("analysis", tenant_id, request.as_ref())?;
        let ttl = request.cache_policy.unwrap_or(self.config.cache_policy).ttl();
        if ttl.is_some() {
            if let Some(hit) = cache_get::<PatternAnalysisResult>(self.cache.as_ref(), &signature).await {
                if hit.success {
                    debug!(tenant = %tenant_id, key = %signature, "pattern analysis cache hit");
                    return Ok(hit);
                }
            }
        }

        let scope_hash = signature_key("scope", tenant_id, &scope_signature(&request))?;
        let observations = self.observations(tenant_id, &request).await?;

        let mut tasks = JoinSet::new();
        for &scope in &request.scopes {
            let this = self.clone();
            let request = Arc::clone(&request);
            let observations = observations.clone();
            let key = format!("scope:{tenant_id}:{}:{}", scope.as_str(), hash_part(&scope_hash));
            tasks.spawn(async move {
                let outcome = this.scope_cached(tenant_id, scope, &key, &request, &observations).await;
                (scope, outcome)
            });
        }

        let mut analyses = Vec::new();
        let mut failed_scopes = Vec::new();
        let mut finished = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((scope, Ok(a))) => {
                    finished.insert(scope);
                    analyses.push(a);
                }
                Ok((scope, Err(e))) => {
                    finished.insert(scope);
                    warn!(tenant = %tenant_id, scope = ?scope, error = %e, "scope analysis failed");
                    failed_scopes.push(FailedScope {
                        scope,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(e) => warn!(tenant = %tenant_id, error = %e, "scope task did not complete"),
            }
        }
        for &scope in request.scopes.iter().filter(|s| !finished.contains(*s)) {
            failed_scopes.push(FailedScope {
                scope,
                kind: ErrorKind::Computation,
                message: "scope task did not complete".to_string(),
            });
        }
        analyses.sort_by_key(|a| a.scope);
        failed_scopes.sort_by_key(|f| f.scope);

        if analyses.is_empty() {
            warn!(tenant = %tenant_id, failed = failed_scopes.len(), "every pattern scope failed");
            self.notifier.notify(Notification::new(
                tenant_id,
                NotificationKind::PatternIntegrationFailed,
                json!({ "signature": signature, "failed_scopes": failed_scopes.len() }),
            ));
            return Ok(PatternAnalysisResult {
                signature,
                success: false,
                analyses,
                failed_scopes,
                contributions: Vec::new(),
                insights: Vec::new(),
                recommendations: Vec::new(),
                merged_multipliers: BTreeMap::new(),
                validation: None,
                conflicts: Vec::new(),
                overall_confidence: 0.0,
                generated_at: Utc::now(),
                error: Some("all requested scopes failed".to_string()),
            });
        }

        let evidence: Vec<PatternEvidence> = analyses.iter().map(PatternEvidence::from).collect();
        let validation = self
            .validator
            .validate(&ValidationRequest::new(vec![PatternSet::new("orchestrator", evidence)]));

        let contributions = integration::contributions(&analyses, &request.strategy, request.end);
        let insights = integration::insights(&analyses, &contributions, self.config.insight_confidence_threshold);
        let recommendations = integration::recommendations(&analyses, &insights);
        let (merged_multipliers, conflicts) = integration::resolve_conflicts(&analyses, request.conflict_resolution);
        let overall_confidence = integration::overall_confidence(&contributions, validation.data_quality);

        let result = PatternAnalysisResult {
            signature: signature.clone(),
            success: true,
            analyses,
            failed_scopes,
            contributions,
            insights,
            recommendations,
            merged_multipliers,
            validation: Some(validation),
            conflicts,
            overall_confidence,
            generated_at: Utc::now(),
            error: None,
        };

        if let Some(ttl) = ttl {
            cache_set(self.cache.as_ref(), &signature, &result, ttl).await;
        }
        self.notifier.notify(Notification::new(
            tenant_id,
            NotificationKind::PatternIntegrationCompleted,
            json!({
                "signature": result.signature,
                "scopes": result.analyses.len(),
                "failed_scopes": result.failed_scopes.len(),
                "overall_confidence": result.overall_confidence,
            }),
        ));
        info!(
            tenant = %tenant_id,
            scopes = result.analyses.len(),
            failed = result.failed_scopes.len(),
            overall_confidence = result.overall_confidence,
            "pattern integration completed"
        );
        Ok(result)
    }

    /// Extract once for every data-driven scope. Validation errors propagate;
    /// other failures are handed to the scopes that need the data.
    async fn observations(&self, tenant_id: TenantId, request: &PatternAnalysisRequest) -> ForecastResult<Observations> {
        let needs_data = request
            .scopes
            .iter()
            .any(|s| !matches!(s, PatternScope::HolidayEvents | PatternScope::Ramadan));
        if !needs_data {
            return Ok(Ok(Arc::new(Vec::new())));
        }
        match self.extractor.extract(tenant_id, &request.time_series_request()).await {
            Ok(obs) => Ok(Ok(Arc::new(obs))),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "observation extraction failed");
                Ok(Err(e))
            }
        }
    }

    async fn scope_cached(
        &self,
        tenant_id: TenantId,
        scope: PatternScope,
        key: &str,
        request: &PatternAnalysisRequest,
        observations: &Observations,
    ) -> ForecastResult<ScopeAnalysis> {
        if let Some(hit) = cache_get::<ScopeAnalysis>(self.cache.as_ref(), key).await {
            debug!(tenant = %tenant_id, scope = ?scope, "scope analysis cache hit");
            return Ok(hit);
        }
        let analysis = self.analyze(tenant_id, scope, request, observations).await?;
        cache_set(self.cache.as_ref(), key, &analysis, self.config.scope_cache_ttl).await;
        Ok(analysis)
    }

    async fn analyze(
        &self,
        tenant_id: TenantId,
        scope: PatternScope,
        request: &PatternAnalysisRequest,
        observations: &Observations,
    ) -> ForecastResult<ScopeAnalysis> {
        let data = || observations.as_ref().map(|o| o.as_slice()).map_err(Clone::clone);
        match scope {
            PatternScope::HolidayEvents => self.holiday_events(tenant_id, request).await,
            PatternScope::Ramadan => self.ramadan_phases(tenant_id, request).await,
            PatternScope::DayOfWeek => scopes::day_of_week(data()?),
            PatternScope::PaydayCycle => scopes::payday_cycle(data()?),
            PatternScope::MonthlySeasonality => scopes::monthly_seasonality(data()?),
            PatternScope::Trend => scopes::trend(data()?),
            PatternScope::CategoryMix => scopes::category_mix(data()?, &request.category_slugs),
            PatternScope::Regional => scopes::regional(data()?, request.region.as_deref()),
            PatternScope::PromotionalSpikes => scopes::promotional_spikes(data()?),
            PatternScope::WeatherSeason => scopes::weather_season(data()?),
        }
    }

    fn learning_request(request: &PatternAnalysisRequest) -> PatternLearningRequest {
        let mut req = PatternLearningRequest::new(request.business_type, request.end);
        req.region = request.region.clone();
        req.metric = request.metric;
        req.category_slugs = request.category_slugs.clone();
        req
    }

    /// Cached catalogue effects, learning them first when none are cached.
    async fn holiday_events(&self, tenant_id: TenantId, request: &PatternAnalysisRequest) -> ForecastResult<ScopeAnalysis> {
        let scope = PatternScope::HolidayEvents;
        let key = PatternScopeKey::new(request.business_type, request.region.clone());
        // Delegated events belong to the Ramadan scope only when it can run.
        let delegated: BTreeSet<&str> = self
            .learner
            .catalogue()
            .events()
            .iter()
            .filter(|e| e.delegated && self.ramadan.as_ref().is_some_and(|r| r.handles(&e.name)))
            .map(|e| e.name.as_str())
            .collect();

        let mut effects: Vec<_> = self
            .learner
            .cached_effects(tenant_id, &key)
            .await
            .into_values()
            .filter(|e| !delegated.contains(e.event_name.as_str()))
            .collect();
        if effects.is_empty() {
            let learned = self.learner.learn(tenant_id, &Self::learning_request(request)).await?;
            if !learned.success {
                return Err(ForecastError::computation(
                    learned.error.unwrap_or_else(|| "pattern learning failed".to_string()),
                ));
            }
            effects = learned
                .effects
                .into_iter()
                .filter(|e| !delegated.contains(e.event_name.as_str()))
                .collect();
        }
        if effects.is_empty() {
            return Err(ForecastError::insufficient(scope.as_str(), 1, 0));
        }

        let mut multipliers = BTreeMap::new();
        // Event lift spread over the month it falls in.
        let mut monthly: BTreeMap<u32, f64> = BTreeMap::new();
        for e in &effects {
            multipliers.insert(format!("event:{}", e.event_name), e.multiplier);
            if let Some((start, end)) = e.windows.last() {
                let days = ((*end - *start).num_days() + 1) as f64;
                *monthly.entry(start.month()).or_insert(0.0) += (e.multiplier - 1.0) * (days / 30.0).min(1.0);
            }
        }
        for (month, lift) in monthly {
            multipliers.insert(format!("month:{month}"), (1.0 + lift).max(0.0));
        }

        let confidence = stats::mean(&effects.iter().map(|e| e.confidence).collect::<Vec<_>>());
        Ok(ScopeAnalysis {
            scope,
            confidence: stats::clamp(confidence, 0.0, 1.0),
            sample_size: effects.iter().map(|e| e.sample_size).sum(),
            multipliers,
            summary: format!("{} calendar events with learned effects", effects.len()),
            latest_observation: effects.iter().filter_map(|e| e.windows.last().map(|w| w.1)).max(),
        })
    }

    async fn ramadan_phases(&self, tenant_id: TenantId, request: &PatternAnalysisRequest) -> ForecastResult<ScopeAnalysis> {
        let scope = PatternScope::Ramadan;
        let Some(ramadan) = &self.ramadan else {
            return Err(ForecastError::computation("no ramadan learner configured"));
        };
        let key = PatternScopeKey::new(request.business_type, request.region.clone());
        let pattern = match cache_get::<RamadanPattern>(self.cache.as_ref(), &RamadanPatternLearner::cache_key(tenant_id, &key)).await {
            Some(p) if !p.phases.is_empty() => p,
            _ => ramadan.learn_phases(tenant_id, &Self::learning_request(request)).await?,
        };
        if pattern.phases.is_empty() {
            return Err(ForecastError::insufficient(scope.as_str(), 1, 0));
        }

        let mut multipliers = BTreeMap::new();
        let mut categories: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (phase, effect) in &pattern.phases {
            multipliers.insert(format!("phase:{}", phase.label()), effect.multiplier);
            for (slug, m) in &effect.category_multipliers {
                categories.entry(slug.as_str()).or_default().push(*m);
            }
        }
        for (slug, ms) in categories {
            multipliers.insert(format!("category:{slug}"), stats::mean(&ms));
        }

        let confidence = stats::mean(&pattern.phases.values().map(|p| p.confidence).collect::<Vec<_>>());
        let last_year = request.end.year();
        let latest = pattern
            .phases
            .keys()
            .filter_map(|p| p.window(last_year).filter(|w| w.end <= request.end).or_else(|| p.window(last_year - 1)))
            .map(|w| w.end)
            .max();
        Ok(ScopeAnalysis {
            scope,
            confidence: stats::clamp(confidence, 0.0, 1.0),
            sample_size: pattern.phases.values().map(|p| u64::from(p.occurrences)).sum(),
            multipliers,
            summary: format!("{} Ramadan phases learned", pattern.phases.len()),
            latest_observation: latest,
        })
    }
}

fn scope_signature(request: &PatternAnalysisRequest) -> ScopeSignature<'_> {
    ScopeSignature {
        business_type: request.business_type,
        region: request.region.as_deref(),
        start: request.start,
        end: request.end,
        product_ids: &request.product_ids,
        category_id: request.category_id,
        location_id: request.location_id,
        metric: request.metric,
        category_slugs: &request.category_slugs,
    }
}

/// Hash component of a `prefix:tenant:hash` key.
fn hash_part(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractorConfig, LearnerConfig};
    use crate::orchestration::types::{CachePolicy, ConflictResolution};
    use crate::patterns::{PatternEffect, Provenance, SeasonalBreakdown, effect_cache_key};
    use crate::testing::{FailingTransactions, MemoryCache, MemoryRunStore, StaticCatalog, StaticTransactions};
    use crate::timeseries::TransactionRecord;
    use chrono::Days;
    use stockcast_events::InMemoryNotificationBus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// 180 days of sales with a Saturday peak and two locations.
    fn history(product: ProductId, a: LocationId, b: LocationId) -> Vec<TransactionRecord> {
        let start = d(2024, 1, 1);
        let mut out = Vec::new();
        for i in 0..180u64 {
            let date = start.checked_add_days(Days::new(i)).unwrap();
            let base = if date.weekday() == chrono::Weekday::Sat { 30.0 } else { 10.0 };
            out.push(TransactionRecord::sale(date, product, base, 2.0).with_location(a));
            out.push(TransactionRecord::sale(date, product, base * 2.0, 2.0).with_location(b));
        }
        out
    }

    struct Harness {
        orchestrator: PatternOrchestrator,
        cache: Arc<MemoryCache>,
        bus: Arc<InMemoryNotificationBus>,
    }

    fn harness(transactions: Arc<dyn crate::ports::TransactionSource>) -> Harness {
        let cache = Arc::new(MemoryCache::default());
        let bus = Arc::new(InMemoryNotificationBus::new());
        let extractor = TimeSeriesExtractor::new(
            Arc::clone(&transactions),
            Arc::new(StaticCatalog::default()),
            cache.clone(),
            ExtractorConfig::default(),
        );
        let learner = PatternLearner::new(
            transactions,
            cache.clone(),
            Arc::new(MemoryRunStore::default()),
            bus.clone(),
            LearnerConfig::default(),
        );
        let orchestrator =
            PatternOrchestrator::new(extractor, learner, cache.clone(), bus.clone(), OrchestratorConfig::default());
        Harness { orchestrator, cache, bus }
    }

    fn request() -> PatternAnalysisRequest {
        PatternAnalysisRequest::new(BusinessType::Grocery, d(2024, 1, 1), d(2024, 6, 28))
    }

    #[tokio::test]
    async fn failed_scopes_are_isolated() {
        let product = ProductId::new();
        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        let req = request().with_scopes(&[
            PatternScope::DayOfWeek,
            PatternScope::Regional,
            PatternScope::Ramadan,
            PatternScope::Trend,
        ]);

        let result = h.orchestrator.integrate(TenantId::new(), &req).await.unwrap();
        assert!(result.success);
        assert_eq!(result.analyses.len() + result.failed_scopes.len(), 4);
        assert!(result.failed_scopes.iter().any(|f| f.scope == PatternScope::Ramadan));

        let dow = result.analyses.iter().find(|a| a.scope == PatternScope::DayOfWeek).unwrap();
        assert!(dow.multipliers["weekday:5"] > 1.5);
        assert!(result.overall_confidence <= integration::MAX_OVERALL_CONFIDENCE);
        assert!(result.validation.is_some());
        assert_eq!(
            h.bus.history().last().unwrap().kind(),
            NotificationKind::PatternIntegrationCompleted
        );
    }

    #[tokio::test]
    async fn all_failed_is_unsuccessful_and_not_cached() {
        let h = harness(Arc::new(FailingTransactions));
        let tenant = TenantId::new();
        let req = request().with_scopes(&[PatternScope::DayOfWeek, PatternScope::Trend]);

        let result = h.orchestrator.integrate(tenant, &req).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_scopes.len(), 2);
        assert!(result.failed_scopes.iter().all(|f| f.kind == ErrorKind::Storage));
        assert!(!h.cache.contains(&result.signature));
        assert_eq!(h.bus.history().last().unwrap().kind(), NotificationKind::PatternIntegrationFailed);
    }

    #[tokio::test]
    async fn successful_results_are_cached_by_signature() {
        let product = ProductId::new();
        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        let tenant = TenantId::new();
        let req = request().with_scopes(&[PatternScope::Trend, PatternScope::DayOfWeek]);

        let first = h.orchestrator.integrate(tenant, &req).await.unwrap();
        assert!(h.cache.contains(&first.signature));

        let reordered = request().with_scopes(&[PatternScope::DayOfWeek, PatternScope::Trend]);
        let second = h.orchestrator.integrate(tenant, &reordered).await.unwrap();
        assert_eq!(first.signature, second.signature);
        assert_eq!(first.generated_at, second.generated_at);
    }

    #[tokio::test]
    async fn disabled_policy_skips_result_cache() {
        let product = ProductId::new();
        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        let req = request()
            .with_scopes(&[PatternScope::DayOfWeek])
            .with_cache_policy(CachePolicy::Disabled);
        let result = h.orchestrator.integrate(TenantId::new(), &req).await.unwrap();
        assert!(result.success);
        assert!(!h.cache.contains(&result.signature));
    }

    #[tokio::test]
    async fn invalid_request_is_an_error() {
        let h = harness(Arc::new(StaticTransactions::new(Vec::new())));
        let req = PatternAnalysisRequest::new(BusinessType::Grocery, d(2024, 6, 1), d(2024, 1, 1));
        let err = h.orchestrator.integrate(TenantId::new(), &req).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn overlapping_keys_are_resolved() {
        let product = ProductId::new();
        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        let req = request()
            .with_scopes(&[PatternScope::MonthlySeasonality, PatternScope::WeatherSeason, PatternScope::DayOfWeek])
            .with_conflict_resolution(ConflictResolution::Conservative);
        let result = h.orchestrator.integrate(TenantId::new(), &req).await.unwrap();
        for conflict in &result.conflicts {
            let closest = conflict
                .candidates
                .iter()
                .map(|c| (c.multiplier - 1.0).abs())
                .fold(f64::INFINITY, f64::min);
            assert!(((conflict.resolved - 1.0).abs() - closest).abs() < 1e-12);
        }
        for (k, m) in &result.merged_multipliers {
            assert!(*m >= 0.0, "{k} negative");
        }
    }

    async fn seed_effect(cache: &MemoryCache, tenant: TenantId, event: &str, multiplier: f64, window: (NaiveDate, NaiveDate)) {
        let scope = PatternScopeKey::new(BusinessType::Grocery, None);
        let effect = PatternEffect {
            event_name: event.to_string(),
            scope: scope.clone(),
            multiplier,
            confidence: 0.8,
            sample_size: 60,
            occurrences: 2,
            seasonal_breakdown: SeasonalBreakdown::default(),
            category_multipliers: BTreeMap::new(),
            windows: vec![window],
            provenance: Provenance {
                data_points: 60,
                last_updated: Utc::now(),
                significance: 0.9,
                variability_score: 0.9,
                trend_stability: 0.5,
            },
        };
        cache_set(
            cache,
            &effect_cache_key(tenant, &scope, event),
            &effect,
            std::time::Duration::from_secs(60),
        )
        .await;
    }

    #[tokio::test]
    async fn holiday_scope_keeps_ramadan_without_a_ramadan_learner() {
        let product = ProductId::new();
        let req = request().with_scopes(&[PatternScope::HolidayEvents]);
        let tenant = TenantId::new();

        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        seed_effect(&h.cache, tenant, "ramadan", 1.5, (d(2024, 3, 12), d(2024, 4, 10))).await;
        seed_effect(&h.cache, tenant, "christmas", 2.0, (d(2023, 12, 24), d(2023, 12, 26))).await;
        let result = h.orchestrator.integrate(tenant, &req).await.unwrap();
        let holiday = result
            .analyses
            .iter()
            .find(|a| a.scope == PatternScope::HolidayEvents)
            .unwrap();
        assert_eq!(holiday.multipliers.get("event:ramadan"), Some(&1.5));
        assert_eq!(holiday.multipliers.get("event:christmas"), Some(&2.0));

        let h = harness(Arc::new(StaticTransactions::new(history(product, LocationId::new(), LocationId::new()))));
        seed_effect(&h.cache, tenant, "ramadan", 1.5, (d(2024, 3, 12), d(2024, 4, 10))).await;
        seed_effect(&h.cache, tenant, "christmas", 2.0, (d(2023, 12, 24), d(2023, 12, 26))).await;
        let with_ramadan = h.orchestrator.clone().with_ramadan(Arc::new(RamadanPatternLearner::new(
            Arc::new(StaticTransactions::new(Vec::new())),
            h.cache.clone(),
            LearnerConfig::default(),
        )));
        let result = with_ramadan.integrate(tenant, &req).await.unwrap();
        let holiday = result
            .analyses
            .iter()
            .find(|a| a.scope == PatternScope::HolidayEvents)
            .unwrap();
        assert!(!holiday.multipliers.contains_key("event:ramadan"));
        assert!(holiday.multipliers.contains_key("event:christmas"));
    }
}
