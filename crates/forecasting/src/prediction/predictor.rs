use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stockcast_core::{
    CategoryId, ErrorKind, ForecastError, ForecastResult, LocationId, ModelId, PredictionId, ProductId, TenantId,
};
use stockcast_events::{Notification, NotificationKind, NotificationSink};

use crate::config::PredictorConfig;
use crate::patterns::{DynamicMultiplier, PatternLearner};
use crate::ports::{CacheStore, cache_get, cache_set, signature_key};
use crate::prediction::selector::ModelSelector;
use crate::prediction::types::{
    BusinessImpact, ForecastModel, ForecastPoint, InsightKind, InsightSeverity, ModelArtifact, ModelType,
    PatternContext, Prediction, PredictionInsight, PredictionOutcome, PredictionRequest, PredictionType, RiskLevel,
};
use crate::stats;
use crate::timeseries::{FeatureVector, TimeSeriesExtractor, features};

const MIN_CONFIDENCE: f64 = 0.1;
const AGE_DECAY_FLOOR: f64 = 0.7;
const LOW_CONFIDENCE: f64 = 0.7;
const VOLUME_DISCOUNT_UNITS: f64 = 1000.0;

/// Point value of one model on one feature vector, clamped at zero.
///
/// Only linear models are evaluated; every other family returns the last
/// observed value (artifact first, then the `lag_1` feature).
pub fn model_point(model_type: ModelType, artifact: &ModelArtifact, features: &FeatureVector) -> ForecastResult<f64> {
    let value = match model_type {
        ModelType::Linear => {
            artifact
                .weights
                .iter()
                .map(|(name, w)| w * features.get(name).unwrap_or(0.0))
                .sum::<f64>()
                + artifact.intercept
        }
        ModelType::ExponentialSmoothing | ModelType::Arima | ModelType::Prophet | ModelType::XgBoost => artifact
            .last_observed
            .or_else(|| features.get("lag_1"))
            .ok_or_else(|| ForecastError::insufficient(format!("{model_type} last observed value"), 1, 0))?,
    };
    if !value.is_finite() {
        return Err(ForecastError::computation(format!("{model_type} produced a non-finite value")));
    }
    Ok(value.max(0.0))
}

/// `clamp((1 - min(1, error)) * completeness * age_decay, 0.1, 1)`.
pub fn prediction_confidence(error_metric: f64, completeness: f64, model_age_days: i64) -> f64 {
    let accuracy = 1.0 - error_metric.max(0.0).min(1.0);
    let age_decay = (1.0 - 0.3 * model_age_days.max(0) as f64 / 365.0).max(AGE_DECAY_FLOOR);
    stats::clamp(accuracy * completeness * age_decay, MIN_CONFIDENCE, 1.0)
}

/// `p -/+ p * (1 - c) * 0.5`, lower bound at least zero.
pub fn bounds(point: f64, confidence: f64) -> (f64, f64) {
    let spread = point * (1.0 - confidence) * 0.5;
    ((point - spread).max(0.0), point + spread)
}

/// Restocking insights for a demand figure.
pub fn insights(demand: f64, confidence: f64, current_stock: Option<f64>, safety_factor: f64) -> Vec<PredictionInsight> {
    let mut out = Vec::new();

    if let Some(stock) = current_stock {
        if stock < demand {
            let shortage = demand - stock;
            let severity = if shortage > 0.5 * demand {
                InsightSeverity::Critical
            } else {
                InsightSeverity::Warning
            };
            out.push(PredictionInsight {
                kind: InsightKind::StockoutAlert,
                severity,
                message: format!("stock of {stock:.0} is {shortage:.0} units short of predicted demand {demand:.0}"),
                value: Some(shortage),
            });
        }

        let risk = stockout_risk(demand, stock);
        let tier = if risk > 0.7 {
            Some(InsightSeverity::Critical)
        } else if risk > 0.4 {
            Some(InsightSeverity::Medium)
        } else {
            None
        };
        if let Some(severity) = tier {
            out.push(PredictionInsight {
                kind: InsightKind::StockoutRisk,
                severity,
                message: format!("stockout risk {:.0}%", risk * 100.0),
                value: Some(risk),
            });
        }

        let target = demand * (1.0 + safety_factor);
        if stock < target {
            let quantity = (target - stock).ceil();
            let mut message = format!("reorder {quantity:.0} units to cover demand plus safety stock");
            if quantity > VOLUME_DISCOUNT_UNITS {
                message.push_str("; order size qualifies for a volume discount");
            }
            out.push(PredictionInsight {
                kind: InsightKind::ReorderRecommendation,
                severity: InsightSeverity::Info,
                message,
                value: Some(quantity),
            });
        }
    }

    if confidence < LOW_CONFIDENCE {
        out.push(PredictionInsight {
            kind: InsightKind::LowConfidence,
            severity: InsightSeverity::Warning,
            message: format!("confidence {confidence:.2} is low; review before acting"),
            value: Some(confidence),
        });
    }
    out
}

/// Share of demand that current stock cannot absorb, in [0, 1).
pub fn stockout_risk(demand: f64, stock: f64) -> f64 {
    if demand <= 0.0 {
        return 0.0;
    }
    demand / (demand + stock.max(0.0))
}

pub fn business_impact(demand: f64, unit_price: f64, cost_price: f64, current_stock: Option<f64>) -> BusinessImpact {
    let expected_revenue = demand * unit_price;
    let expected_cost = demand * cost_price;
    let ratio = current_stock.filter(|s| *s > 0.0).map(|s| demand / s);

    let (stockout_risk, overstock_risk) = match (current_stock, ratio) {
        (Some(_), Some(r)) => (
            Some(if r >= 1.0 {
                RiskLevel::High
            } else if r >= 0.7 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }),
            Some(if r < 0.3 {
                RiskLevel::High
            } else if r < 0.6 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }),
        ),
        (Some(_), None) => (
            Some(if demand > 0.0 { RiskLevel::High } else { RiskLevel::Low }),
            Some(RiskLevel::Low),
        ),
        (None, _) => (None, None),
    };

    BusinessImpact {
        expected_revenue,
        expected_cost,
        expected_profit: expected_revenue - expected_cost,
        demand_to_stock_ratio: ratio,
        stockout_risk,
        overstock_risk,
    }
}

#[derive(Serialize)]
struct PredictionKey<'a> {
    model_id: ModelId,
    product_id: ProductId,
    prediction_type: PredictionType,
    target_date: NaiveDate,
    horizon_days: u32,
    category_id: Option<CategoryId>,
    location_id: Option<LocationId>,
    feature_overrides: &'a BTreeMap<String, f64>,
    current_stock: Option<f64>,
    pattern_context: Option<&'a PatternContext>,
}

/// Selects a model, predicts, and derives restocking insights.
#[derive(Clone)]
pub struct Predictor {
    selector: ModelSelector,
    extractor: TimeSeriesExtractor,
    learner: Option<PatternLearner>,
    cache: Arc<dyn CacheStore>,
    notifier: Arc<dyn NotificationSink>,
    config: PredictorConfig,
}

impl Predictor {
    pub fn new(
        selector: ModelSelector,
        extractor: TimeSeriesExtractor,
        cache: Arc<dyn CacheStore>,
        notifier: Arc<dyn NotificationSink>,
        config: PredictorConfig,
    ) -> Self {
        Self {
            selector,
            extractor,
            learner: None,
            cache,
            notifier,
            config,
        }
    }

    /// Enables pattern adjustment for requests that carry a pattern context.
    pub fn with_pattern_learner(mut self, learner: PatternLearner) -> Self {
        self.learner = Some(learner);
        self
    }

    pub async fn predict(&self, tenant_id: TenantId, request: &PredictionRequest) -> ForecastResult<Prediction> {
        request.validate(self.config.max_horizon_days)?;

        let model = self
            .selector
            .select(
                tenant_id,
                request.product_id,
                request.category_id,
                request.location_id,
                request.model_type,
            )
            .await?;

        let key = signature_key(
            "prediction",
            tenant_id,
            &PredictionKey {
                model_id: model.id,
                product_id: request.product_id,
                prediction_type: request.prediction_type,
                target_date: request.target_date,
                horizon_days: request.horizon_days,
                category_id: request.category_id,
                location_id: request.location_id,
                feature_overrides: &request.feature_overrides,
                current_stock: request.current_stock,
                pattern_context: request.pattern_context.as_ref(),
            },
        )?;
        if let Some(hit) = cache_get::<Prediction>(self.cache.as_ref(), &key).await {
            debug!(tenant = %tenant_id, product = %request.product_id, "prediction cache hit");
            return Ok(hit);
        }

        let artifact = self.selector.artifact(&model).await?;
        let Some(base) = self.extractor.base_features(tenant_id, request.product_id).await? else {
            return Err(ForecastError::validation(format!("unknown product {}", request.product_id)));
        };
        let model_age_days = (Utc::now().date_naive() - model.trained_at.date_naive()).num_days();
        let error_metric = artifact.error_metric.unwrap_or(model.error_metric);

        let target = self
            .predict_day(tenant_id, request, &model, &artifact, &base, request.target_date, error_metric, model_age_days)
            .await?;

        let time_series = match request.prediction_type {
            PredictionType::Point => None,
            PredictionType::TimeSeries => {
                let mut points = vec![target.0.clone()];
                for offset in 1..u64::from(request.horizon_days) {
                    let Some(date) = request.target_date.checked_add_days(Days::new(offset)) else {
                        break;
                    };
                    let (point, _) = self
                        .predict_day(tenant_id, request, &model, &artifact, &base, date, error_metric, model_age_days)
                        .await?;
                    points.push(point);
                }
                Some(points)
            }
        };

        // Insights and impact cover the whole horizon for time series.
        let demand = time_series
            .as_ref()
            .map(|ts| ts.iter().map(|p| p.value).sum())
            .unwrap_or(target.0.value);
        let current_stock = request.current_stock.or_else(|| base.get("total_quantity").copied());
        let unit_price = request
            .feature_overrides
            .get("unit_price")
            .or_else(|| base.get("unit_price"))
            .copied()
            .unwrap_or(0.0);
        let cost_price = request
            .feature_overrides
            .get("cost_price")
            .or_else(|| base.get("cost_price"))
            .copied()
            .unwrap_or(0.0);

        let (point, pattern_multiplier) = target;
        let prediction = Prediction {
            id: PredictionId::new(),
            tenant_id,
            product_id: request.product_id,
            model_id: model.id,
            model_type: model.model_type,
            prediction_type: request.prediction_type,
            target_date: request.target_date,
            horizon_days: request.horizon_days,
            point_value: point.value,
            lower_bound: point.lower_bound,
            upper_bound: point.upper_bound,
            confidence: point.confidence,
            time_series,
            pattern_multiplier,
            business_impact: Some(business_impact(demand, unit_price, cost_price, current_stock)),
            insights: insights(demand, point.confidence, current_stock, self.config.reorder_safety_factor),
            created_at: Utc::now(),
        };

        cache_set(self.cache.as_ref(), &key, &prediction, self.config.prediction_cache_ttl).await;
        self.notifier.notify(Notification::new(
            tenant_id,
            NotificationKind::PredictionGenerated,
            json!({
                "prediction_id": prediction.id,
                "product_id": prediction.product_id,
                "model_id": prediction.model_id,
                "point_value": prediction.point_value,
            }),
        ));
        info!(
            tenant = %tenant_id,
            product = %request.product_id,
            model = %model.id,
            point = prediction.point_value,
            confidence = prediction.confidence,
            "prediction generated"
        );
        Ok(prediction)
    }

    #[allow(clippy::too_many_arguments)]
    async fn predict_day(
        &self,
        tenant_id: TenantId,
        request: &PredictionRequest,
        model: &ForecastModel,
        artifact: &ModelArtifact,
        base: &BTreeMap<String, f64>,
        date: NaiveDate,
        error_metric: f64,
        model_age_days: i64,
    ) -> ForecastResult<(ForecastPoint, Option<DynamicMultiplier>)> {
        let mut fv = FeatureVector::new(request.product_id, date);
        fv.merge(base);
        fv.merge(&features::temporal_features(date));
        fv.merge(&request.feature_overrides);

        let mut value = model_point(model.model_type, artifact, &fv)?;
        let confidence = prediction_confidence(error_metric, fv.completeness(&model.expected_features), model_age_days);

        let multiplier = match (&self.learner, &request.pattern_context) {
            (Some(learner), Some(ctx)) => Some(self.pattern_multiplier(learner, tenant_id, date, ctx).await),
            _ => None,
        };
        if let Some(m) = &multiplier {
            value *= m.multiplier;
        }

        let (lower_bound, upper_bound) = bounds(value, confidence);
        Ok((
            ForecastPoint {
                date,
                value,
                lower_bound,
                upper_bound,
                confidence,
            },
            multiplier,
        ))
    }

    async fn pattern_multiplier(
        &self,
        learner: &PatternLearner,
        tenant_id: TenantId,
        date: NaiveDate,
        ctx: &PatternContext,
    ) -> DynamicMultiplier {
        learner
            .dynamic_multiplier(tenant_id, date, ctx.business_type, ctx.category.as_deref(), ctx.region.as_deref())
            .await
    }

    /// Settle-all fan-out; outcomes come back in request order.
    pub async fn predict_batch(&self, tenant_id: TenantId, requests: Vec<PredictionRequest>) -> Vec<PredictionOutcome> {
        let product_ids: Vec<ProductId> = requests.iter().map(|r| r.product_id).collect();
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let this = self.clone();
            tasks.spawn(async move { (index, this.predict(tenant_id, &request).await) });
        }

        let mut slots: Vec<Option<ForecastResult<Prediction>>> = vec![None; product_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(tenant = %tenant_id, error = %e, "prediction task did not complete"),
            }
        }

        let outcomes: Vec<PredictionOutcome> = slots
            .into_iter()
            .zip(product_ids)
            .map(|(slot, product_id)| match slot {
                Some(Ok(prediction)) => PredictionOutcome {
                    product_id,
                    prediction: Some(prediction),
                    error_kind: None,
                    error: None,
                },
                Some(Err(e)) => PredictionOutcome {
                    product_id,
                    prediction: None,
                    error_kind: Some(e.kind()),
                    error: Some(e.to_string()),
                },
                None => PredictionOutcome {
                    product_id,
                    prediction: None,
                    error_kind: Some(ErrorKind::Computation),
                    error: Some("prediction task did not complete".to_string()),
                },
            })
            .collect();
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(tenant = %tenant_id, total = outcomes.len(), failed, "batch prediction finished");
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractorConfig, LearnerConfig};
    use crate::patterns::{BusinessType, PatternEffect, PatternScopeKey, Provenance, SeasonalBreakdown, effect_cache_key};
    use crate::prediction::types::ModelStatus;
    use crate::testing::{CountingArtifacts, MemoryCache, MemoryRunStore, StaticCatalog, StaticRegistry, StaticTransactions};
    use crate::timeseries::{InventoryLevel, ProductAttributes};
    use proptest::prelude::*;
    use stockcast_core::LocationId;
    use stockcast_events::InMemoryNotificationBus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn linear_dispatch_clamps_at_zero() {
        let mut artifact = ModelArtifact {
            model_type: ModelType::Linear,
            weights: BTreeMap::from([("unit_price".to_string(), 2.0), ("missing".to_string(), 5.0)]),
            intercept: 10.0,
            last_observed: None,
            error_metric: None,
        };
        let mut fv = FeatureVector::new(ProductId::new(), d(2024, 1, 1));
        fv.insert("unit_price", 3.0);
        assert_eq!(model_point(ModelType::Linear, &artifact, &fv).unwrap(), 16.0);

        artifact.intercept = -100.0;
        assert_eq!(model_point(ModelType::Linear, &artifact, &fv).unwrap(), 0.0);
    }

    #[test]
    fn non_linear_families_use_last_observed() {
        let artifact = ModelArtifact {
            model_type: ModelType::Arima,
            weights: BTreeMap::new(),
            intercept: 0.0,
            last_observed: Some(42.0),
            error_metric: None,
        };
        let fv = FeatureVector::new(ProductId::new(), d(2024, 1, 1));
        assert_eq!(model_point(ModelType::Prophet, &artifact, &fv).unwrap(), 42.0);

        let empty = ModelArtifact { last_observed: None, ..artifact };
        let err = model_point(ModelType::XgBoost, &empty, &fv).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataInsufficiency);
    }

    #[test]
    fn confidence_formula() {
        // Multiplicative: error 0.10 with every feature gives 0.9, half the features 0.45.
        assert!((prediction_confidence(0.1, 1.0, 0) - 0.9).abs() < 1e-12);
        assert!((prediction_confidence(0.1, 0.5, 0) - 0.45).abs() < 1e-12);
        assert!((prediction_confidence(0.0, 1.0, 10_000) - AGE_DECAY_FLOOR).abs() < 1e-12);
        assert_eq!(prediction_confidence(2.0, 1.0, 0), MIN_CONFIDENCE);
    }

    #[test]
    fn bounds_scenario() {
        let (lo, hi) = bounds(100.0, 0.8);
        assert!((lo - 90.0).abs() < 1e-9);
        assert!((hi - 110.0).abs() < 1e-9);
        assert_eq!(bounds(0.0, 0.1), (0.0, 0.0));
    }

    #[test]
    fn stockout_alert_is_critical_above_half_shortage() {
        let found = insights(100.0, 0.9, Some(40.0), 0.2);
        let alert = found.iter().find(|i| i.kind == InsightKind::StockoutAlert).unwrap();
        assert_eq!(alert.severity, InsightSeverity::Critical);
        assert_eq!(alert.value, Some(60.0));

        let found = insights(100.0, 0.9, Some(60.0), 0.2);
        let alert = found.iter().find(|i| i.kind == InsightKind::StockoutAlert).unwrap();
        assert_eq!(alert.severity, InsightSeverity::Warning);
    }

    #[test]
    fn reorder_notes_volume_discount() {
        let found = insights(2_000.0, 0.9, Some(0.0), 0.2);
        let reorder = found.iter().find(|i| i.kind == InsightKind::ReorderRecommendation).unwrap();
        assert_eq!(reorder.value, Some(2_400.0));
        assert!(reorder.message.contains("volume discount"));
        assert!(!found.iter().any(|i| i.kind == InsightKind::LowConfidence));
    }

    #[test]
    fn low_confidence_advisory() {
        let found = insights(10.0, 0.5, None, 0.2);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, InsightKind::LowConfidence);
    }

    #[test]
    fn impact_buckets() {
        let impact = business_impact(100.0, 5.0, 3.0, Some(50.0));
        assert_eq!(impact.expected_revenue, 500.0);
        assert_eq!(impact.expected_profit, 200.0);
        assert_eq!(impact.stockout_risk, Some(RiskLevel::High));
        assert_eq!(impact.overstock_risk, Some(RiskLevel::Low));

        let glut = business_impact(10.0, 5.0, 3.0, Some(100.0));
        assert_eq!(glut.overstock_risk, Some(RiskLevel::High));
        assert_eq!(business_impact(10.0, 1.0, 1.0, None).stockout_risk, None);
    }

    proptest! {
        #[test]
        fn bounds_bracket_the_point(p in 0.0f64..1e6, c in 0.1f64..=1.0) {
            let (lo, hi) = bounds(p, c);
            prop_assert!(lo >= 0.0);
            prop_assert!(lo <= p && p <= hi);
        }

        #[test]
        fn confidence_stays_in_range(e in -1.0f64..5.0, comp in 0.0f64..=1.0, age in 0i64..5000) {
            let c = prediction_confidence(e, comp, age);
            prop_assert!((MIN_CONFIDENCE..=1.0).contains(&c));
        }
    }

    struct Harness {
        predictor: Predictor,
        cache: Arc<MemoryCache>,
        product: ProductId,
        model: ForecastModel,
    }

    fn harness(learner: bool) -> Harness {
        let product = ProductId::new();
        let cache = Arc::new(MemoryCache::default());
        let catalog = StaticCatalog::default().with_product(
            ProductAttributes {
                product_id: product,
                name: "Sirup 500ml".to_string(),
                category_id: None,
                unit_price: 5.0,
                cost_price: 3.0,
                lead_time_days: Some(3),
                shelf_life_days: None,
            },
            vec![InventoryLevel {
                location_id: LocationId::new(),
                quantity: 40.0,
            }],
        );
        let transactions = Arc::new(StaticTransactions::new(Vec::new()));
        let extractor = TimeSeriesExtractor::new(
            transactions.clone(),
            Arc::new(catalog),
            cache.clone(),
            ExtractorConfig::default(),
        );
        let model = ForecastModel {
            id: ModelId::new(),
            model_type: ModelType::Linear,
            status: ModelStatus::Active,
            product_id: Some(product),
            category_id: None,
            location_id: None,
            error_metric: 0.1,
            artifact_ref: "mem://linear".to_string(),
            trained_at: Utc::now(),
            expected_features: vec!["unit_price".to_string(), "day_of_week".to_string()],
        };
        let artifacts = CountingArtifacts::default().with_artifact(
            "mem://linear",
            ModelArtifact {
                model_type: ModelType::Linear,
                weights: BTreeMap::from([("unit_price".to_string(), 20.0)]),
                intercept: 0.0,
                last_observed: None,
                error_metric: None,
            },
        );
        let bus = Arc::new(InMemoryNotificationBus::new());
        let selector = ModelSelector::new(
            Arc::new(StaticRegistry::new(vec![model.clone()])),
            Arc::new(artifacts),
            &PredictorConfig::default(),
        );
        let mut predictor = Predictor::new(selector, extractor, cache.clone(), bus.clone(), PredictorConfig::default());
        if learner {
            predictor = predictor.with_pattern_learner(PatternLearner::new(
                transactions,
                cache.clone(),
                Arc::new(MemoryRunStore::default()),
                bus,
                LearnerConfig::default(),
            ));
        }
        Harness {
            predictor,
            cache,
            product,
            model,
        }
    }

    #[tokio::test]
    async fn point_prediction_end_to_end() {
        let h = harness(false);
        let tenant = TenantId::new();
        let req = PredictionRequest::point(h.product, d(2024, 9, 2));
        let p = h.predictor.predict(tenant, &req).await.unwrap();

        assert_eq!(p.model_id, h.model.id);
        assert!((p.point_value - 100.0).abs() < 1e-9);
        assert!((p.confidence - 0.9).abs() < 1e-9);
        assert!((p.lower_bound - 95.0).abs() < 1e-9);
        assert!(p.time_series.is_none());
        // 40 units on hand against 100 predicted.
        let alert = p.insights.iter().find(|i| i.kind == InsightKind::StockoutAlert).unwrap();
        assert_eq!(alert.severity, InsightSeverity::Critical);
        assert_eq!(p.business_impact.as_ref().unwrap().expected_revenue, 500.0);

        let again = h.predictor.predict(tenant, &req).await.unwrap();
        assert_eq!(again.id, p.id);
    }

    #[tokio::test]
    async fn overrides_win_over_derived_features() {
        let h = harness(false);
        let req = PredictionRequest::point(h.product, d(2024, 9, 2)).with_feature("unit_price", 1.0);
        let p = h.predictor.predict(TenantId::new(), &req).await.unwrap();
        assert!((p.point_value - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cached_predictions_respect_request_inputs() {
        let h = harness(false);
        let tenant = TenantId::new();
        let base = PredictionRequest::point(h.product, d(2024, 9, 2));
        let first = h.predictor.predict(tenant, &base).await.unwrap();
        assert!((first.point_value - 100.0).abs() < 1e-9);
        assert!(first.insights.iter().any(|i| i.kind == InsightKind::StockoutAlert));

        let overridden = base.clone().with_feature("unit_price", 1.0).with_current_stock(10_000.0);
        let second = h.predictor.predict(tenant, &overridden).await.unwrap();
        assert_ne!(second.id, first.id);
        assert!((second.point_value - 20.0).abs() < 1e-9);
        assert!(!second.insights.iter().any(|i| i.kind == InsightKind::StockoutAlert));

        let restocked = base.clone().with_current_stock(10_000.0);
        let third = h.predictor.predict(tenant, &restocked).await.unwrap();
        assert_ne!(third.id, first.id);
        assert!(!third.insights.iter().any(|i| i.kind == InsightKind::StockoutAlert));

        let elsewhere = base.clone().with_location(LocationId::new());
        let fourth = h.predictor.predict(tenant, &elsewhere).await.unwrap();
        assert_ne!(fourth.id, first.id);

        let repeat = h.predictor.predict(tenant, &overridden).await.unwrap();
        assert_eq!(repeat.id, second.id);
    }

    #[tokio::test]
    async fn time_series_covers_horizon() {
        let h = harness(false);
        let req = PredictionRequest::time_series(h.product, d(2024, 9, 2), 7);
        let p = h.predictor.predict(TenantId::new(), &req).await.unwrap();
        let ts = p.time_series.unwrap();
        assert_eq!(ts.len(), 7);
        assert_eq!(ts[6].date, d(2024, 9, 8));
        assert!(ts.iter().all(|pt| pt.lower_bound <= pt.value && pt.value <= pt.upper_bound));
    }

    #[tokio::test]
    async fn pattern_adjustment_scales_point() {
        let h = harness(true);
        let tenant = TenantId::new();
        let scope = PatternScopeKey::new(BusinessType::Grocery, None);
        let effect = PatternEffect {
            event_name: "christmas".to_string(),
            scope: scope.clone(),
            multiplier: 1.5,
            confidence: 0.8,
            sample_size: 100,
            occurrences: 2,
            seasonal_breakdown: SeasonalBreakdown::default(),
            category_multipliers: BTreeMap::new(),
            windows: Vec::new(),
            provenance: Provenance {
                data_points: 100,
                last_updated: Utc::now(),
                significance: 0.9,
                variability_score: 0.9,
                trend_stability: 0.9,
            },
        };
        cache_set(
            h.cache.as_ref(),
            &effect_cache_key(tenant, &scope, "christmas"),
            &effect,
            std::time::Duration::from_secs(60),
        )
        .await;

        let req = PredictionRequest::point(h.product, d(2024, 12, 25)).with_patterns(PatternContext {
            business_type: BusinessType::Grocery,
            category: None,
            region: None,
        });
        let p = h.predictor.predict(tenant, &req).await.unwrap();
        assert!((p.point_value - 150.0).abs() < 1e-9);
        assert_eq!(p.pattern_multiplier.unwrap().multiplier, 1.5);
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let h = harness(false);
        let unknown = ProductId::new();
        let outcomes = h
            .predictor
            .predict_batch(
                TenantId::new(),
                vec![
                    PredictionRequest::point(h.product, d(2024, 9, 2)),
                    PredictionRequest::point(unknown, d(2024, 9, 2)),
                ],
            )
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].product_id, unknown);
        assert_eq!(outcomes[1].error_kind, Some(ErrorKind::ModelUnavailable));
    }
}
