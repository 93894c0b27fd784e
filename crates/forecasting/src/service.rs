//! Public facade over the engine.
//!
//! Validation errors propagate as `Err`; every other outcome is wrapped in a
//! [`ServiceResponse`].

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockcast_core::{ErrorKind, ForecastError, ForecastResult, TenantId};
use stockcast_events::NotificationSink;

use crate::config::EngineConfig;
use crate::orchestration::{PatternAnalysisRequest, PatternAnalysisResult, PatternOrchestrator};
use crate::patterns::{
    BusinessType, DynamicMultiplier, PatternLearner, PatternLearningRequest, PatternLearningResult,
    RamadanPatternLearner, RunStore,
};
use crate::ports::{ArtifactReader, CacheStore, ModelRegistry, PredictionLedger, ProductCatalog, TransactionSource};
use crate::prediction::{
    AccuracyReport, AccuracyValidator, ModelSelector, Prediction, PredictionOutcome, PredictionRequest, Predictor,
};
use crate::timeseries::{TimeSeriesExtractor, TimeSeriesObservation, TimeSeriesRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ServiceError>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(err: &ForecastError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ServiceError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    /// Data is present but the operation reports failure.
    fn partial(data: T, kind: ErrorKind, message: Option<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(ServiceError {
                kind,
                message: message.unwrap_or_else(|| "operation failed".to_string()),
            }),
        }
    }
}

fn respond<T>(operation: &'static str, result: ForecastResult<T>) -> ForecastResult<ServiceResponse<T>> {
    match result {
        Ok(data) => Ok(ServiceResponse::ok(data)),
        Err(e) if e.is_validation() => Err(e),
        Err(e) => {
            warn!(operation, error = %e, "operation failed");
            Ok(ServiceResponse::failed(&e))
        }
    }
}

/// Every port the engine consumes.
#[derive(Clone)]
pub struct EnginePorts {
    pub transactions: Arc<dyn TransactionSource>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub cache: Arc<dyn CacheStore>,
    pub registry: Arc<dyn ModelRegistry>,
    pub artifacts: Arc<dyn ArtifactReader>,
    pub ledger: Arc<dyn PredictionLedger>,
    pub runs: Arc<dyn RunStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

#[derive(Clone)]
pub struct ForecastService {
    extractor: TimeSeriesExtractor,
    learner: PatternLearner,
    orchestrator: PatternOrchestrator,
    predictor: Predictor,
    accuracy: AccuracyValidator,
}

impl ForecastService {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let extractor = TimeSeriesExtractor::new(
            Arc::clone(&ports.transactions),
            Arc::clone(&ports.catalog),
            Arc::clone(&ports.cache),
            config.extractor.clone(),
        );
        let ramadan = Arc::new(RamadanPatternLearner::new(
            Arc::clone(&ports.transactions),
            Arc::clone(&ports.cache),
            config.learner.clone(),
        ));
        let learner = PatternLearner::new(
            Arc::clone(&ports.transactions),
            Arc::clone(&ports.cache),
            Arc::clone(&ports.runs),
            Arc::clone(&ports.notifier),
            config.learner.clone(),
        )
        .with_specialized(ramadan.clone());
        let orchestrator = PatternOrchestrator::new(
            extractor.clone(),
            learner.clone(),
            Arc::clone(&ports.cache),
            Arc::clone(&ports.notifier),
            config.orchestrator.clone(),
        )
        .with_ramadan(ramadan);
        let selector = ModelSelector::new(ports.registry, ports.artifacts, &config.predictor);
        let predictor = Predictor::new(
            selector,
            extractor.clone(),
            Arc::clone(&ports.cache),
            Arc::clone(&ports.notifier),
            config.predictor,
        )
        .with_pattern_learner(learner.clone());
        let accuracy = AccuracyValidator::new(ports.ledger, ports.notifier);

        Self {
            extractor,
            learner,
            orchestrator,
            predictor,
            accuracy,
        }
    }

    pub async fn extract_time_series(
        &self,
        tenant_id: TenantId,
        request: &TimeSeriesRequest,
    ) -> ForecastResult<ServiceResponse<Vec<TimeSeriesObservation>>> {
        respond("extract_time_series", self.extractor.extract(tenant_id, request).await)
    }

    pub async fn learn_pattern_effects(
        &self,
        tenant_id: TenantId,
        request: &PatternLearningRequest,
    ) -> ForecastResult<ServiceResponse<PatternLearningResult>> {
        let result = self.learner.learn(tenant_id, request).await?;
        Ok(if result.success {
            ServiceResponse::ok(result)
        } else {
            let message = result.error.clone();
            ServiceResponse::partial(result, ErrorKind::Computation, message)
        })
    }

    pub async fn integrate_patterns(
        &self,
        tenant_id: TenantId,
        request: &PatternAnalysisRequest,
    ) -> ForecastResult<ServiceResponse<PatternAnalysisResult>> {
        let result = self.orchestrator.integrate(tenant_id, request).await?;
        Ok(if result.success {
            ServiceResponse::ok(result)
        } else {
            let kind = result.failed_scopes.first().map(|f| f.kind).unwrap_or(ErrorKind::Computation);
            let message = result.error.clone();
            ServiceResponse::partial(result, kind, message)
        })
    }

    pub async fn predict(
        &self,
        tenant_id: TenantId,
        request: &PredictionRequest,
    ) -> ForecastResult<ServiceResponse<Prediction>> {
        respond("predict", self.predictor.predict(tenant_id, request).await)
    }

    /// Per-request outcomes; the batch itself always succeeds.
    pub async fn predict_batch(
        &self,
        tenant_id: TenantId,
        requests: Vec<PredictionRequest>,
    ) -> ServiceResponse<Vec<PredictionOutcome>> {
        ServiceResponse::ok(self.predictor.predict_batch(tenant_id, requests).await)
    }

    pub async fn validate_predictions(
        &self,
        tenant_id: TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ForecastResult<ServiceResponse<AccuracyReport>> {
        respond(
            "validate_predictions",
            self.accuracy.validate_predictions(tenant_id, start, end).await,
        )
    }

    /// Never fails; see [`PatternLearner::dynamic_multiplier`].
    pub async fn dynamic_multiplier(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        business_type: BusinessType,
        category: Option<&str>,
        region: Option<&str>,
    ) -> DynamicMultiplier {
        self.learner
            .dynamic_multiplier(tenant_id, date, business_type, category, region)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CountingArtifacts, FailingTransactions, MemoryCache, MemoryRunStore, StaticCatalog, StaticLedger,
        StaticRegistry, StaticTransactions,
    };
    use stockcast_core::ProductId;
    use stockcast_events::InMemoryNotificationBus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn service(transactions: Arc<dyn TransactionSource>) -> ForecastService {
        ForecastService::new(
            EnginePorts {
                transactions,
                catalog: Arc::new(StaticCatalog::default()),
                cache: Arc::new(MemoryCache::default()),
                registry: Arc::new(StaticRegistry::new(Vec::new())),
                artifacts: Arc::new(CountingArtifacts::default()),
                ledger: Arc::new(StaticLedger::new(Vec::new())),
                runs: Arc::new(MemoryRunStore::default()),
                notifier: Arc::new(InMemoryNotificationBus::new()),
            },
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn validation_errors_propagate() {
        let svc = service(Arc::new(StaticTransactions::new(Vec::new())));
        let bad = TimeSeriesRequest::new(d(2024, 2, 1), d(2024, 1, 1));
        assert!(svc.extract_time_series(TenantId::new(), &bad).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn other_failures_are_wrapped() {
        let svc = service(Arc::new(FailingTransactions));
        let req = TimeSeriesRequest::new(d(2024, 1, 1), d(2024, 1, 31));
        let resp = svc.extract_time_series(TenantId::new(), &req).await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.unwrap().kind, ErrorKind::Storage);

        let resp = svc
            .predict(TenantId::new(), &PredictionRequest::point(ProductId::new(), d(2024, 2, 1)))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().kind, ErrorKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn failed_learning_run_keeps_its_result() {
        let svc = service(Arc::new(FailingTransactions));
        let req = PatternLearningRequest::new(BusinessType::Grocery, d(2024, 12, 31));
        let resp = svc.learn_pattern_effects(TenantId::new(), &req).await.unwrap();
        assert!(!resp.success);
        assert!(resp.data.is_some_and(|r| !r.success));
    }

    #[tokio::test]
    async fn multiplier_without_patterns_is_neutral() {
        let svc = service(Arc::new(StaticTransactions::new(Vec::new())));
        let m = svc
            .dynamic_multiplier(TenantId::new(), d(2024, 12, 25), BusinessType::Grocery, None, None)
            .await;
        assert!(m.is_neutral());
    }
}
