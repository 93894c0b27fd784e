use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{CategoryId, ForecastError, ForecastResult, RunId};

use crate::patterns::run::RunState;
use crate::timeseries::DemandMetric;

/// Tenant business vertical; selects which catalogued events apply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    General,
    Grocery,
    Restaurant,
    Fashion,
    Electronics,
    Pharmacy,
    Stationery,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::General => "general",
            BusinessType::Grocery => "grocery",
            BusinessType::Restaurant => "restaurant",
            BusinessType::Fashion => "fashion",
            BusinessType::Electronics => "electronics",
            BusinessType::Pharmacy => "pharmacy",
            BusinessType::Stationery => "stationery",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general" | "retail" => Some(BusinessType::General),
            "grocery" => Some(BusinessType::Grocery),
            "restaurant" | "food_service" => Some(BusinessType::Restaurant),
            "fashion" => Some(BusinessType::Fashion),
            "electronics" => Some(BusinessType::Electronics),
            "pharmacy" => Some(BusinessType::Pharmacy),
            "stationery" => Some(BusinessType::Stationery),
            _ => None,
        }
    }
}

impl fmt::Display for BusinessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a learned effect applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternScopeKey {
    pub business_type: BusinessType,
    pub region: Option<String>,
}

impl PatternScopeKey {
    pub fn new(business_type: BusinessType, region: Option<String>) -> Self {
        Self {
            business_type,
            region: region.map(|r| r.trim().to_ascii_lowercase()).filter(|r| !r.is_empty()),
        }
    }

    /// Region segment used in cache keys (`all` when unset).
    pub fn region_key(&self) -> &str {
        self.region.as_deref().unwrap_or("all")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalBreakdown {
    pub pre: f64,
    pub during: f64,
    pub post: f64,
}

impl Default for SeasonalBreakdown {
    fn default() -> Self {
        Self {
            pre: 1.0,
            during: 1.0,
            post: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Baseline plus event samples across all occurrences.
    pub data_points: u64,
    pub last_updated: DateTime<Utc>,
    pub significance: f64,
    pub variability_score: f64,
    pub trend_stability: f64,
}

/// A learned calendar effect for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEffect {
    pub event_name: String,
    pub scope: PatternScopeKey,
    /// Event-window demand relative to baseline.
    pub multiplier: f64,
    pub confidence: f64,
    pub sample_size: u64,
    pub occurrences: u32,
    pub seasonal_breakdown: SeasonalBreakdown,
    /// Keyed by category slug.
    pub category_multipliers: BTreeMap<String, f64>,
    /// Event windows (start, end) of each analysed occurrence.
    pub windows: Vec<(NaiveDate, NaiveDate)>,
    pub provenance: Provenance,
}

/// Validated input of one learning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLearningRequest {
    pub business_type: BusinessType,
    pub region: Option<String>,
    /// `None` learns every applicable catalogued event.
    pub events: Option<Vec<String>>,
    pub lookback_years: Option<u32>,
    /// Occurrences must have ended on or before this date.
    pub reference_date: NaiveDate,
    pub confidence_threshold: Option<f64>,
    pub metric: DemandMetric,
    /// Maps tenant categories to the catalogue's category slugs.
    pub category_slugs: BTreeMap<CategoryId, String>,
}

impl PatternLearningRequest {
    pub fn new(business_type: BusinessType, reference_date: NaiveDate) -> Self {
        Self {
            business_type,
            region: None,
            events: None,
            lookback_years: None,
            reference_date,
            confidence_threshold: None,
            metric: DemandMetric::Quantity,
            category_slugs: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_events(mut self, events: &[&str]) -> Self {
        self.events = Some(events.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn with_lookback_years(mut self, years: u32) -> Self {
        self.lookback_years = Some(years);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_category_slug(mut self, category_id: CategoryId, slug: impl Into<String>) -> Self {
        self.category_slugs.insert(category_id, slug.into());
        self
    }

    pub fn scope(&self) -> PatternScopeKey {
        PatternScopeKey::new(self.business_type, self.region.clone())
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.lookback_years == Some(0) || self.lookback_years.is_some_and(|y| y > 10) {
            return Err(ForecastError::validation("lookback_years must be between 1 and 10"));
        }
        if self
            .confidence_threshold
            .is_some_and(|t| !(0.0..=1.0).contains(&t))
        {
            return Err(ForecastError::validation("confidence_threshold must be within [0, 1]"));
        }
        if self.events.as_ref().is_some_and(|e| e.is_empty()) {
            return Err(ForecastError::validation("events, when given, must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No occurrence had a usable baseline.
    InsufficientData { detail: String },
    BelowConfidenceThreshold { confidence: f64, threshold: f64 },
    UnknownEvent,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub event_name: String,
    pub reason: SkipReason,
}

/// Outcome of one learning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLearningResult {
    pub run_id: RunId,
    pub success: bool,
    pub state: RunState,
    pub effects: Vec<PatternEffect>,
    pub skipped: Vec<SkippedEvent>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// What produced a looked-up multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierSource {
    Neutral,
    Event { event_name: String },
    Category { event_name: String, category: String },
    Specialized { label: String },
    Fallback,
}

/// Result of a date lookup; never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicMultiplier {
    pub multiplier: f64,
    pub confidence: f64,
    pub source: MultiplierSource,
}

impl DynamicMultiplier {
    pub fn neutral() -> Self {
        Self {
            multiplier: 1.0,
            confidence: 1.0,
            source: MultiplierSource::Neutral,
        }
    }

    pub fn fallback() -> Self {
        Self {
            multiplier: 1.0,
            confidence: 0.5,
            source: MultiplierSource::Fallback,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.source == MultiplierSource::Neutral
    }

    /// Category-level matches beat event-level ones; ties go to confidence.
    pub(crate) fn specificity(&self) -> u8 {
        match self.source {
            MultiplierSource::Category { .. } => 2,
            MultiplierSource::Event { .. } | MultiplierSource::Specialized { .. } => 1,
            MultiplierSource::Neutral | MultiplierSource::Fallback => 0,
        }
    }
}
