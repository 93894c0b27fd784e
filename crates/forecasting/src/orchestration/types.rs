use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{CategoryId, ErrorKind, ForecastError, ForecastResult, LocationId, ProductId};

use crate::patterns::BusinessType;
use crate::timeseries::{DemandMetric, TimeSeriesRequest};
use crate::validation::{PatternEvidence, ValidationReport};

/// Closed set of independent pattern analyses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    HolidayEvents,
    Ramadan,
    DayOfWeek,
    PaydayCycle,
    MonthlySeasonality,
    Trend,
    CategoryMix,
    Regional,
    PromotionalSpikes,
    WeatherSeason,
}

impl PatternScope {
    pub const ALL: [PatternScope; 10] = [
        PatternScope::HolidayEvents,
        PatternScope::Ramadan,
        PatternScope::DayOfWeek,
        PatternScope::PaydayCycle,
        PatternScope::MonthlySeasonality,
        PatternScope::Trend,
        PatternScope::CategoryMix,
        PatternScope::Regional,
        PatternScope::PromotionalSpikes,
        PatternScope::WeatherSeason,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternScope::HolidayEvents => "holiday_events",
            PatternScope::Ramadan => "ramadan",
            PatternScope::DayOfWeek => "day_of_week",
            PatternScope::PaydayCycle => "payday_cycle",
            PatternScope::MonthlySeasonality => "monthly_seasonality",
            PatternScope::Trend => "trend",
            PatternScope::CategoryMix => "category_mix",
            PatternScope::Regional => "regional",
            PatternScope::PromotionalSpikes => "promotional_spikes",
            PatternScope::WeatherSeason => "weather_season",
        }
    }

    /// Default weight table.
    ///
    /// Regional and Ramadan analyses are weighted above the rest; the values
    /// are carried over unchanged from the production tuning.
    pub fn default_weight(&self) -> f64 {
        match self {
            PatternScope::HolidayEvents => 1.0,
            PatternScope::Ramadan => 1.15,
            PatternScope::DayOfWeek => 0.8,
            PatternScope::PaydayCycle => 0.85,
            PatternScope::MonthlySeasonality => 0.9,
            PatternScope::Trend => 0.75,
            PatternScope::CategoryMix => 0.7,
            PatternScope::Regional => 1.2,
            PatternScope::PromotionalSpikes => 0.65,
            PatternScope::WeatherSeason => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "weights", rename_all = "snake_case")]
pub enum PrioritizationStrategy {
    #[default]
    ConfidenceWeighted,
    BusinessImpact,
    RecencyWeighted,
    Balanced,
    /// Scopes missing from the map fall back to the default table.
    Custom(BTreeMap<PatternScope, f64>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    #[default]
    ConfidenceWeighted,
    HighestConfidence,
    /// Pick the candidate closest to 1.0.
    Conservative,
}

/// Result cache lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Aggressive,
    Balanced,
    Conservative,
    Disabled,
}

impl CachePolicy {
    /// `None` disables caching.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::Aggressive => Some(Duration::from_secs(6 * 60 * 60)),
            CachePolicy::Balanced => Some(Duration::from_secs(60 * 60)),
            CachePolicy::Conservative => Some(Duration::from_secs(15 * 60)),
            CachePolicy::Disabled => None,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Some(CachePolicy::Aggressive),
            "balanced" => Some(CachePolicy::Balanced),
            "conservative" => Some(CachePolicy::Conservative),
            "disabled" | "off" | "none" => Some(CachePolicy::Disabled),
            _ => None,
        }
    }
}

/// Validated integration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysisRequest {
    pub business_type: BusinessType,
    pub region: Option<String>,
    pub scopes: Vec<PatternScope>,
    pub strategy: PrioritizationStrategy,
    pub conflict_resolution: ConflictResolution,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub product_ids: Vec<ProductId>,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
    pub metric: DemandMetric,
    pub category_slugs: BTreeMap<CategoryId, String>,
    /// Falls back to the orchestrator's configured policy.
    pub cache_policy: Option<CachePolicy>,
}

impl PatternAnalysisRequest {
    pub fn new(business_type: BusinessType, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            business_type,
            region: None,
            scopes: PatternScope::ALL.to_vec(),
            strategy: PrioritizationStrategy::default(),
            conflict_resolution: ConflictResolution::default(),
            start,
            end,
            product_ids: Vec::new(),
            category_id: None,
            location_id: None,
            metric: DemandMetric::Quantity,
            category_slugs: BTreeMap::new(),
            cache_policy: None,
        }
    }

    pub fn with_scopes(mut self, scopes: &[PatternScope]) -> Self {
        self.scopes = scopes.to_vec();
        self
    }

    pub fn with_strategy(mut self, strategy: PrioritizationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_conflict_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = resolution;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_products(mut self, product_ids: Vec<ProductId>) -> Self {
        self.product_ids = product_ids;
        self
    }

    pub fn with_category_slug(mut self, category_id: CategoryId, slug: impl Into<String>) -> Self {
        self.category_slugs.insert(category_id, slug.into());
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    pub fn validate(&self, max_scopes: usize) -> ForecastResult<()> {
        if self.start > self.end {
            return Err(ForecastError::validation("analysis start is after end"));
        }
        if self.scopes.is_empty() {
            return Err(ForecastError::validation("at least one scope is required"));
        }
        if self.scopes.len() > max_scopes {
            return Err(ForecastError::validation(format!(
                "{} scopes requested; at most {max_scopes} allowed",
                self.scopes.len()
            )));
        }
        if let PrioritizationStrategy::Custom(weights) = &self.strategy {
            if weights.values().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(ForecastError::validation("custom weights must be finite and non-negative"));
            }
        }
        Ok(())
    }

    /// Canonical form: scopes sorted and deduplicated, products sorted.
    pub fn normalized(&self) -> Self {
        let mut n = self.clone();
        n.scopes.sort();
        n.scopes.dedup();
        n.product_ids.sort();
        n.product_ids.dedup();
        n.region = n.region.map(|r| r.trim().to_ascii_lowercase()).filter(|r| !r.is_empty());
        n
    }

    pub fn time_series_request(&self) -> TimeSeriesRequest {
        let mut req = TimeSeriesRequest::new(self.start, self.end)
            .with_products(self.product_ids.clone())
            .with_metric(self.metric);
        req.category_id = self.category_id;
        req.location_id = self.location_id;
        req
    }
}

/// Output of one scope analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeAnalysis {
    pub scope: PatternScope,
    pub confidence: f64,
    pub sample_size: u64,
    /// Keys are namespaced (`weekday:0`, `month:12`, `category:fashion`, `event:lebaran`, ...).
    pub multipliers: BTreeMap<String, f64>,
    pub summary: String,
    /// Last date that contributed data.
    pub latest_observation: Option<NaiveDate>,
}

impl ScopeAnalysis {
    /// Mean absolute deviation of the multipliers from neutral.
    pub fn business_impact(&self) -> f64 {
        if self.multipliers.is_empty() {
            return 0.0;
        }
        self.multipliers.values().map(|m| (m - 1.0).abs()).sum::<f64>() / self.multipliers.len() as f64
    }

    /// Strongest effect as (key, multiplier).
    pub fn strongest(&self) -> Option<(&str, f64)> {
        self.multipliers
            .iter()
            .max_by(|a, b| (a.1 - 1.0).abs().total_cmp(&(b.1 - 1.0).abs()))
            .map(|(k, m)| (k.as_str(), *m))
    }
}

impl From<&ScopeAnalysis> for PatternEvidence {
    fn from(a: &ScopeAnalysis) -> Self {
        let mut e = PatternEvidence::new(
            a.scope.as_str(),
            a.strongest().map(|(_, m)| m).unwrap_or(1.0),
            a.confidence,
            a.sample_size,
        );
        e.keyed_multipliers = a.multipliers.clone();
        e
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedScope {
    pub scope: PatternScope,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeContribution {
    pub scope: PatternScope,
    pub confidence: f64,
    pub weight: f64,
    pub contribution_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedInsight {
    pub scope: PatternScope,
    pub headline: String,
    pub confidence: f64,
    pub contribution_score: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub scope: PatternScope,
    pub priority: RecommendationPriority,
    pub action: String,
    pub contribution_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub scope: PatternScope,
    pub multiplier: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub key: String,
    pub candidates: Vec<ConflictCandidate>,
    pub resolved: f64,
    pub method: ConflictResolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysisResult {
    pub signature: String,
    pub success: bool,
    pub analyses: Vec<ScopeAnalysis>,
    pub failed_scopes: Vec<FailedScope>,
    pub contributions: Vec<ScopeContribution>,
    pub insights: Vec<IntegratedInsight>,
    pub recommendations: Vec<Recommendation>,
    pub merged_multipliers: BTreeMap<String, f64>,
    pub validation: Option<ValidationReport>,
    pub conflicts: Vec<ConflictRecord>,
    pub overall_confidence: f64,
    pub generated_at: DateTime<Utc>,
    pub error: Option<String>,
}
