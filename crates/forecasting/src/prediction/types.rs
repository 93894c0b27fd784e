use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{
    CategoryId, ErrorKind, ForecastError, ForecastResult, LocationId, ModelId, PredictionId, ProductId, TenantId,
};

use crate::patterns::{BusinessType, DynamicMultiplier};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Linear,
    ExponentialSmoothing,
    Arima,
    Prophet,
    #[serde(rename = "xgboost")]
    XgBoost,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Linear => "linear",
            ModelType::ExponentialSmoothing => "exponential_smoothing",
            ModelType::Arima => "arima",
            ModelType::Prophet => "prophet",
            ModelType::XgBoost => "xgboost",
        }
    }
}

impl core::fmt::Display for ModelType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Deployed,
    Active,
    Retired,
    Failed,
}

impl ModelStatus {
    /// Only deployed and active models serve predictions.
    pub fn is_servable(&self) -> bool {
        matches!(self, ModelStatus::Deployed | ModelStatus::Active)
    }
}

/// Registry entry for a trained model. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel {
    pub id: ModelId,
    pub model_type: ModelType,
    pub status: ModelStatus,
    pub product_id: Option<ProductId>,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
    /// MAPE-like error as a fraction (0.12 = 12%).
    pub error_metric: f64,
    pub artifact_ref: String,
    pub trained_at: DateTime<Utc>,
    pub expected_features: Vec<String>,
}

impl ForecastModel {
    /// Unset model fields match anything.
    pub fn matches(&self, product_id: ProductId, category_id: Option<CategoryId>, location_id: Option<LocationId>) -> bool {
        self.product_id.is_none_or(|p| p == product_id)
            && self.category_id.is_none_or(|c| Some(c) == category_id)
            && self.location_id.is_none_or(|l| Some(l) == location_id)
    }
}

/// Trained parameters loaded from an artifact reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: ModelType,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub intercept: f64,
    pub last_observed: Option<f64>,
    /// Overrides the registry error metric when present.
    pub error_metric: Option<f64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    Point,
    TimeSeries,
}

/// Inputs for the optional pattern adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternContext {
    pub business_type: BusinessType,
    pub category: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub product_id: ProductId,
    pub prediction_type: PredictionType,
    pub target_date: NaiveDate,
    /// Days forecast for time series; must be at least one.
    pub horizon_days: u32,
    /// Restrict selection to one model family.
    pub model_type: Option<ModelType>,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
    /// Caller-provided feature values; these win over derived ones.
    pub feature_overrides: BTreeMap<String, f64>,
    /// Falls back to the catalogue's total stock.
    pub current_stock: Option<f64>,
    pub pattern_context: Option<PatternContext>,
}

impl PredictionRequest {
    pub fn point(product_id: ProductId, target_date: NaiveDate) -> Self {
        Self {
            product_id,
            prediction_type: PredictionType::Point,
            target_date,
            horizon_days: 1,
            model_type: None,
            category_id: None,
            location_id: None,
            feature_overrides: BTreeMap::new(),
            current_stock: None,
            pattern_context: None,
        }
    }

    pub fn time_series(product_id: ProductId, target_date: NaiveDate, horizon_days: u32) -> Self {
        Self {
            prediction_type: PredictionType::TimeSeries,
            horizon_days,
            ..Self::point(product_id, target_date)
        }
    }

    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.feature_overrides.insert(name.into(), value);
        self
    }

    pub fn with_current_stock(mut self, stock: f64) -> Self {
        self.current_stock = Some(stock);
        self
    }

    pub fn with_patterns(mut self, context: PatternContext) -> Self {
        self.pattern_context = Some(context);
        self
    }

    pub fn validate(&self, max_horizon_days: u32) -> ForecastResult<()> {
        if self.horizon_days == 0 {
            return Err(ForecastError::validation("horizon must be at least one day"));
        }
        if self.horizon_days > max_horizon_days {
            return Err(ForecastError::validation(format!(
                "horizon of {} days exceeds the maximum of {max_horizon_days}",
                self.horizon_days
            )));
        }
        if let Some(stock) = self.current_stock {
            if !stock.is_finite() || stock < 0.0 {
                return Err(ForecastError::validation("current stock must be a non-negative number"));
            }
        }
        if self.feature_overrides.values().any(|v| !v.is_finite()) {
            return Err(ForecastError::validation("feature overrides must be finite"));
        }
        Ok(())
    }
}

/// One day of a time-series forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessImpact {
    pub expected_revenue: f64,
    pub expected_cost: f64,
    pub expected_profit: f64,
    /// Predicted demand over current stock; `None` when stock is unknown.
    pub demand_to_stock_ratio: Option<f64>,
    pub stockout_risk: Option<RiskLevel>,
    pub overstock_risk: Option<RiskLevel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    StockoutAlert,
    StockoutRisk,
    ReorderRecommendation,
    LowConfidence,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Info,
    Medium,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInsight {
    pub kind: InsightKind,
    pub severity: InsightSeverity,
    pub message: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub model_id: ModelId,
    pub model_type: ModelType,
    pub prediction_type: PredictionType,
    pub target_date: NaiveDate,
    pub horizon_days: u32,
    pub point_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
    pub time_series: Option<Vec<ForecastPoint>>,
    pub pattern_multiplier: Option<DynamicMultiplier>,
    pub business_impact: Option<BusinessImpact>,
    pub insights: Vec<PredictionInsight>,
    pub created_at: DateTime<Utc>,
}

/// Per-request result of a batch prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub product_id: ProductId,
    pub prediction: Option<Prediction>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl PredictionOutcome {
    pub fn is_success(&self) -> bool {
        self.prediction.is_some()
    }
}

/// A stored prediction with ground truth attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualizedPrediction {
    pub prediction_id: PredictionId,
    pub model_id: ModelId,
    pub model_type: ModelType,
    pub product_id: ProductId,
    pub target_date: NaiveDate,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub actual: f64,
}
