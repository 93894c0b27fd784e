//! The forecasting service wired to the in-memory adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};

use stockcast_core::{ErrorKind, LocationId, ModelId, PredictionId, ProductId, TenantId};
use stockcast_events::{InMemoryNotificationBus, NotificationKind};
use stockcast_forecasting::orchestration::{PatternAnalysisRequest, PatternScope};
use stockcast_forecasting::patterns::{BusinessType, MultiplierSource, PatternLearningRequest, RunStore};
use stockcast_forecasting::prediction::{
    ActualizedPrediction, ForecastModel, ModelArtifact, ModelStatus, ModelType, PatternContext, PredictionRequest,
};
use stockcast_forecasting::timeseries::{InventoryLevel, ProductAttributes, TransactionRecord};
use stockcast_forecasting::{EngineConfig, EnginePorts, ForecastService};
use stockcast_infra::{
    InMemoryCache, InMemoryModelStore, InMemoryPredictionLedger, InMemoryProductCatalog, InMemoryRunStore,
    InMemoryTransactionSource,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct World {
    service: ForecastService,
    bus: Arc<InMemoryNotificationBus>,
    runs: Arc<InMemoryRunStore>,
    ledger: Arc<InMemoryPredictionLedger>,
    tenant: TenantId,
    product: ProductId,
    model: ForecastModel,
}

/// Daily sales from Dec 2021 to Jan 2024. Late-December demand doubles every year.
fn history(product: ProductId) -> Vec<TransactionRecord> {
    let mut out = Vec::new();
    let mut date = d(2021, 12, 1);
    while date <= d(2024, 1, 31) {
        let festive = date.month() == 12 && date.day() >= 20;
        let qty = if festive {
            10.0 * 2f64.powi(date.year() - 2021)
        } else {
            10.0
        };
        out.push(TransactionRecord::sale(date, product, qty, 3.0).with_unit_price(5.0));
        date = date + Days::new(1);
    }
    out
}

fn world() -> World {
    let tenant = TenantId::new();
    let product = ProductId::new();

    let transactions = Arc::new(InMemoryTransactionSource::new());
    transactions.record(tenant, history(product));

    let catalog = Arc::new(InMemoryProductCatalog::new());
    catalog.upsert_product(
        tenant,
        ProductAttributes {
            product_id: product,
            name: "Sirup 500ml".to_string(),
            category_id: None,
            unit_price: 5.0,
            cost_price: 3.0,
            lead_time_days: Some(3),
            shelf_life_days: None,
        },
    );
    catalog.set_levels(
        tenant,
        product,
        vec![InventoryLevel {
            location_id: LocationId::new(),
            quantity: 500.0,
        }],
    );

    let models = Arc::new(InMemoryModelStore::new());
    let model = ForecastModel {
        id: ModelId::new(),
        model_type: ModelType::Linear,
        status: ModelStatus::Deployed,
        product_id: Some(product),
        category_id: None,
        location_id: None,
        error_metric: 0.1,
        artifact_ref: "mem://sirup/linear".to_string(),
        trained_at: Utc::now(),
        expected_features: vec!["unit_price".to_string()],
    };
    models.register(
        tenant,
        model.clone(),
        ModelArtifact {
            model_type: ModelType::Linear,
            weights: BTreeMap::from([("unit_price".to_string(), 20.0)]),
            intercept: 0.0,
            last_observed: None,
            error_metric: None,
        },
    );

    let ledger = Arc::new(InMemoryPredictionLedger::new());
    let runs = InMemoryRunStore::arc();
    let bus = Arc::new(InMemoryNotificationBus::new());
    let service = ForecastService::new(
        EnginePorts {
            transactions,
            catalog,
            cache: Arc::new(InMemoryCache::new()),
            registry: models.clone(),
            artifacts: models,
            ledger: ledger.clone(),
            runs: runs.clone(),
            notifier: bus.clone(),
        },
        EngineConfig::default(),
    );

    World {
        service,
        bus,
        runs,
        ledger,
        tenant,
        product,
        model,
    }
}

#[tokio::test]
async fn learned_christmas_effect_lifts_the_forecast() {
    let w = world();
    let request = PatternLearningRequest::new(BusinessType::Grocery, d(2024, 1, 31));
    let learned = w.service.learn_pattern_effects(w.tenant, &request).await.unwrap();
    assert!(learned.success);

    let result = learned.data.unwrap();
    let christmas = result
        .effects
        .iter()
        .find(|e| e.event_name == "christmas")
        .expect("christmas learned");
    assert!((christmas.multiplier - 2.0).abs() < 1e-9);
    assert_eq!(christmas.occurrences, 2);

    let m = w
        .service
        .dynamic_multiplier(w.tenant, d(2024, 12, 25), BusinessType::Grocery, None, None)
        .await;
    assert!((m.multiplier - 2.0).abs() < 1e-9);
    assert_eq!(
        m.source,
        MultiplierSource::Event {
            event_name: "christmas".to_string()
        }
    );

    let plain = w
        .service
        .predict(w.tenant, &PredictionRequest::point(w.product, d(2024, 12, 25)))
        .await
        .unwrap()
        .data
        .unwrap();
    assert!((plain.point_value - 100.0).abs() < 1e-9);
    assert_eq!(plain.model_id, w.model.id);

    let festive = w
        .service
        .predict(
            w.tenant,
            &PredictionRequest::point(w.product, d(2024, 12, 25)).with_patterns(PatternContext {
                business_type: BusinessType::Grocery,
                category: None,
                region: None,
            }),
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert!((festive.point_value - 200.0).abs() < 1e-9);

    let kinds: Vec<NotificationKind> = w.bus.history().iter().map(|n| n.kind()).collect();
    assert!(kinds.contains(&NotificationKind::PatternLearningCompleted));
    assert!(kinds.contains(&NotificationKind::PredictionGenerated));
    assert!(!w.runs.list(w.tenant, 10).unwrap().is_empty());
}

#[tokio::test]
async fn other_tenants_see_nothing() {
    let w = world();
    let request = PatternLearningRequest::new(BusinessType::Grocery, d(2024, 1, 31));
    w.service.learn_pattern_effects(w.tenant, &request).await.unwrap();

    let stranger = TenantId::new();
    let m = w
        .service
        .dynamic_multiplier(stranger, d(2024, 12, 25), BusinessType::Grocery, None, None)
        .await;
    assert!(m.is_neutral());

    let resp = w
        .service
        .predict(stranger, &PredictionRequest::point(w.product, d(2024, 12, 25)))
        .await
        .unwrap();
    assert!(!resp.success);
    assert_eq!(resp.error.unwrap().kind, ErrorKind::ModelUnavailable);
}

#[tokio::test]
async fn integration_reports_holiday_and_weekday_scopes() {
    let w = world();
    let request = PatternAnalysisRequest::new(BusinessType::Grocery, d(2022, 1, 1), d(2024, 1, 31))
        .with_scopes(&[PatternScope::HolidayEvents, PatternScope::DayOfWeek]);
    let resp = w.service.integrate_patterns(w.tenant, &request).await.unwrap();
    assert!(resp.success);

    let result = resp.data.unwrap();
    assert!(result.failed_scopes.is_empty());
    assert_eq!(result.analyses.len(), 2);
    let holiday = result
        .analyses
        .iter()
        .find(|a| a.scope == PatternScope::HolidayEvents)
        .unwrap();
    assert!(holiday.multipliers.contains_key("event:christmas"));
    assert!(result.overall_confidence <= 0.95);
}

#[tokio::test]
async fn accuracy_report_over_ledger() {
    let w = world();
    for (predicted, actual) in [(100.0, 110.0), (50.0, 50.0), (10.0, 0.0)] {
        w.ledger.append(
            w.tenant,
            ActualizedPrediction {
                prediction_id: PredictionId::new(),
                model_id: w.model.id,
                model_type: ModelType::Linear,
                product_id: w.product,
                target_date: d(2024, 3, 1),
                predicted,
                lower_bound: predicted * 0.9,
                upper_bound: predicted * 1.1,
                actual,
            },
        );
    }
    let report = w
        .service
        .validate_predictions(w.tenant, d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(report.overall.evaluated, 3);
    assert_eq!(report.per_model.len(), 1);
    // Zero actual excluded: (10/110 + 0) / 2.
    assert!((report.overall.mape - (10.0 / 110.0) / 2.0 * 100.0).abs() < 1e-9);

    let empty = w
        .service
        .validate_predictions(TenantId::new(), d(2024, 1, 1), d(2024, 12, 31))
        .await
        .unwrap();
    assert_eq!(empty.error.unwrap().kind, ErrorKind::DataInsufficiency);
}
