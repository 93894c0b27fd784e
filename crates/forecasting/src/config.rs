//! Engine configuration.
//!
//! Every section has a `Default` matching production behaviour. Overrides come
//! from `STOCKCAST_*` environment variables (see [`EngineConfig::from_env`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestration::CachePolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// TTL used when the request does not carry one.
    pub default_cache_ttl: Duration,
    /// Longest accepted extraction window.
    pub max_range_days: i64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl: Duration::from_secs(60 * 60),
            max_range_days: 1_095,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    pub lookback_years: u32,
    pub confidence_threshold: f64,
    pub effect_cache_ttl: Duration,
    pub pre_event_days: i64,
    pub post_event_days: i64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            lookback_years: 2,
            confidence_threshold: 0.5,
            effect_cache_ttl: Duration::from_secs(24 * 60 * 60),
            pre_event_days: 14,
            post_event_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// TTL of each per-(scope, tenant) sub-analysis.
    pub scope_cache_ttl: Duration,
    pub cache_policy: CachePolicy,
    /// Contributions above this confidence become integrated insights.
    pub insight_confidence_threshold: f64,
    pub max_scopes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scope_cache_ttl: Duration::from_secs(15 * 60),
            cache_policy: CachePolicy::Balanced,
            insight_confidence_threshold: 0.8,
            max_scopes: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub prediction_cache_ttl: Duration,
    /// Fixed-delay eviction for memoised model artifacts.
    pub artifact_memo_ttl: Duration,
    pub artifact_memo_capacity: u64,
    pub max_horizon_days: u32,
    pub reorder_safety_factor: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            prediction_cache_ttl: Duration::from_secs(60 * 60),
            artifact_memo_ttl: Duration::from_secs(30 * 60),
            artifact_memo_capacity: 512,
            max_horizon_days: 365,
            reorder_safety_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub extractor: ExtractorConfig,
    pub learner: LearnerConfig,
    pub orchestrator: OrchestratorConfig,
    pub predictor: PredictorConfig,
}

impl EngineConfig {
    /// Defaults overridden by `STOCKCAST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("STOCKCAST_TIMESERIES_CACHE_TTL_SECS") {
            cfg.extractor.default_cache_ttl = Duration::from_secs(parse("STOCKCAST_TIMESERIES_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOCKCAST_MAX_RANGE_DAYS") {
            cfg.extractor.max_range_days = parse("STOCKCAST_MAX_RANGE_DAYS", &v)?;
        }
        if let Some(v) = lookup("STOCKCAST_LOOKBACK_YEARS") {
            cfg.learner.lookback_years = parse("STOCKCAST_LOOKBACK_YEARS", &v)?;
        }
        if let Some(v) = lookup("STOCKCAST_CONFIDENCE_THRESHOLD") {
            let threshold: f64 = parse("STOCKCAST_CONFIDENCE_THRESHOLD", &v)?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    key: "STOCKCAST_CONFIDENCE_THRESHOLD".to_string(),
                    value: v,
                });
            }
            cfg.learner.confidence_threshold = threshold;
        }
        if let Some(v) = lookup("STOCKCAST_PATTERN_CACHE_TTL_SECS") {
            cfg.learner.effect_cache_ttl = Duration::from_secs(parse("STOCKCAST_PATTERN_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOCKCAST_SCOPE_CACHE_TTL_SECS") {
            cfg.orchestrator.scope_cache_ttl = Duration::from_secs(parse("STOCKCAST_SCOPE_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOCKCAST_CACHE_POLICY") {
            cfg.orchestrator.cache_policy =
                CachePolicy::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                    key: "STOCKCAST_CACHE_POLICY".to_string(),
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup("STOCKCAST_PREDICTION_CACHE_TTL_SECS") {
            cfg.predictor.prediction_cache_ttl =
                Duration::from_secs(parse("STOCKCAST_PREDICTION_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("STOCKCAST_ARTIFACT_MEMO_TTL_SECS") {
            cfg.predictor.artifact_memo_ttl = Duration::from_secs(parse("STOCKCAST_ARTIFACT_MEMO_TTL_SECS", &v)?);
        }

        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
