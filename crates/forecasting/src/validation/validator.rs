//! Cross-pattern validation.
//!
//! Every scope is independent: an erroring check degrades to a default
//! score instead of aborting the batch. The validator never reads clocks and
//! iterates ordered collections only, so identical inputs give identical
//! reports.

use std::collections::BTreeMap;

use tracing::debug;

use stockcast_core::{ForecastError, ForecastResult};

use crate::stats;
use crate::validation::types::{
    PatternEvidence, QualityGrade, ScopeValidation, ValidationReport, ValidationRequest, ValidationScope,
    ValidationStatus,
};

/// Score given to a scope whose check failed.
pub const DEGRADED_SCORE: f64 = 0.5;

/// Plausible range for any demand multiplier.
const PLAUSIBLE_MIN: f64 = 0.2;
const PLAUSIBLE_MAX: f64 = 5.0;

const OUTLIER_Z: f64 = 2.5;

enum Check {
    Scored {
        score: f64,
        measurements: BTreeMap<String, f64>,
        recommendations: Vec<String>,
    },
    NotApplicable(&'static str),
}

impl Check {
    fn scored(score: f64) -> Self {
        Check::Scored {
            score: stats::clamp(score, 0.0, 1.0),
            measurements: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }

    fn measure(mut self, key: &str, value: f64) -> Self {
        if let Check::Scored { measurements, .. } = &mut self {
            measurements.insert(key.to_string(), value);
        }
        self
    }

    fn recommend(mut self, when: bool, text: impl Into<String>) -> Self {
        if let (true, Check::Scored { recommendations, .. }) = (when, &mut self) {
            recommendations.push(text.into());
        }
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrossPatternValidator;

impl CrossPatternValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, request: &ValidationRequest) -> ValidationReport {
        let mut requested: Vec<ValidationScope> = if request.scopes.is_empty() {
            ValidationScope::ALL.to_vec()
        } else {
            request.scopes.clone()
        };
        let mut seen = Vec::with_capacity(requested.len());
        requested.retain(|s| {
            let fresh = !seen.contains(s);
            seen.push(*s);
            fresh
        });

        let scopes: Vec<ScopeValidation> = requested.into_iter().map(|s| run_scope(s, request)).collect();

        let applicable: Vec<f64> = scopes
            .iter()
            .filter(|s| s.status != ValidationStatus::NotApplicable)
            .map(|s| s.score)
            .collect();
        let overall_score = if applicable.is_empty() {
            DEGRADED_SCORE
        } else {
            stats::mean(&applicable)
        };

        let data_quality = scopes
            .iter()
            .find(|s| s.scope == ValidationScope::DataQuality && s.status != ValidationStatus::NotApplicable)
            .map(|s| s.score)
            .unwrap_or(overall_score);

        let mut recommendations = Vec::new();
        for s in &scopes {
            for r in &s.recommendations {
                if !recommendations.contains(r) {
                    recommendations.push(r.clone());
                }
            }
        }

        ValidationReport {
            scopes,
            overall_score,
            grade: QualityGrade::from_score(overall_score),
            data_quality,
            recommendations,
        }
    }
}

fn run_scope(scope: ValidationScope, request: &ValidationRequest) -> ScopeValidation {
    let outcome = match scope {
        ValidationScope::TemporalConsistency => temporal_consistency(request),
        ValidationScope::ConfidenceAlignment => confidence_alignment(request),
        ValidationScope::DataQuality => data_quality(request),
        ValidationScope::StatisticalSignificance => statistical_significance(request),
        ValidationScope::SeasonalLogic => seasonal_logic(request),
        ValidationScope::CrossPatternCoherence => cross_pattern_coherence(request),
        ValidationScope::OutlierDetection => outlier_detection(request),
        ValidationScope::PredictiveAccuracy => predictive_accuracy(request),
    };

    match outcome {
        Ok(Check::Scored {
            score,
            measurements,
            recommendations,
        }) => ScopeValidation {
            scope,
            status: ValidationStatus::from_score(score),
            score,
            measurements,
            recommendations,
            error: None,
        },
        Ok(Check::NotApplicable(reason)) => ScopeValidation {
            scope,
            status: ValidationStatus::NotApplicable,
            score: DEGRADED_SCORE,
            measurements: BTreeMap::new(),
            recommendations: Vec::new(),
            error: Some(reason.to_string()),
        },
        Err(e) => {
            debug!(scope = scope.as_str(), error = %e, "validation scope degraded");
            ScopeValidation {
                scope,
                status: ValidationStatus::Failed,
                score: DEGRADED_SCORE,
                measurements: BTreeMap::new(),
                recommendations: vec![format!("{} could not be evaluated", scope.as_str())],
                error: Some(e.to_string()),
            }
        }
    }
}

fn require_patterns(request: &ValidationRequest, scope: ValidationScope, min: usize) -> ForecastResult<Vec<&PatternEvidence>> {
    let patterns: Vec<&PatternEvidence> = request.all_patterns().collect();
    if patterns.len() < min {
        return Err(ForecastError::insufficient(scope.as_str(), min, patterns.len()));
    }
    Ok(patterns)
}

/// Same-named patterns across sets agree, and pre/during/post move smoothly.
fn temporal_consistency(request: &ValidationRequest) -> ForecastResult<Check> {
    let patterns = require_patterns(request, ValidationScope::TemporalConsistency, 1)?;

    let mut by_name: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for p in &patterns {
        by_name.entry(p.name.as_str()).or_default().push(p.multiplier);
    }
    let agreement: Vec<f64> = by_name
        .values()
        .map(|ms| (1.0 - stats::coefficient_of_variation(ms).abs()).max(0.0))
        .collect();

    let with_breakdown: Vec<_> = patterns.iter().filter_map(|p| p.breakdown.as_ref()).collect();
    let abrupt = with_breakdown
        .iter()
        .filter(|b| (b.during - b.pre).abs() > 1.0 && (b.during - b.post).abs() > 1.0)
        .count();
    let smoothness = if with_breakdown.is_empty() {
        1.0
    } else {
        1.0 - abrupt as f64 / with_breakdown.len() as f64
    };

    let score = 0.6 * stats::mean(&agreement) + 0.4 * smoothness;
    Ok(Check::scored(score)
        .measure("cross_set_agreement", stats::mean(&agreement))
        .measure("smoothness", smoothness)
        .measure("abrupt_patterns", abrupt as f64)
        .recommend(abrupt > 0, "review patterns whose event spike has no ramp-up or decay"))
}

/// Confidence should track evidence volume.
fn confidence_alignment(request: &ValidationRequest) -> ForecastResult<Check> {
    let patterns = require_patterns(request, ValidationScope::ConfidenceAlignment, 1)?;

    let gaps: Vec<f64> = patterns
        .iter()
        .map(|p| {
            let expected = 0.5 + 0.5 * (p.sample_size as f64 / 500.0).min(1.0);
            (p.confidence - expected).abs()
        })
        .collect();
    let overconfident = patterns
        .iter()
        .filter(|p| p.confidence > 0.8 && p.sample_size < 50)
        .count();

    let mean_gap = stats::mean(&gaps);
    Ok(Check::scored(1.0 - mean_gap)
        .measure("mean_confidence_gap", mean_gap)
        .measure("overconfident_patterns", overconfident as f64)
        .recommend(overconfident > 0, "lower confidence for patterns backed by fewer than 50 samples"))
}

fn data_quality(request: &ValidationRequest) -> ForecastResult<Check> {
    let patterns = require_patterns(request, ValidationScope::DataQuality, 1)?;

    let per_pattern: Vec<f64> = patterns
        .iter()
        .map(|p| {
            let volume = (p.sample_size as f64 / 100.0).min(1.0);
            let history = (p.occurrences as f64 / 3.0).min(1.0);
            (volume + history) / 2.0
        })
        .collect();
    let total_samples: u64 = patterns.iter().map(|p| p.sample_size).sum();
    let thin = patterns.iter().filter(|p| p.sample_size < 30).count();

    Ok(Check::scored(stats::mean(&per_pattern))
        .measure("total_samples", total_samples as f64)
        .measure("thin_patterns", thin as f64)
        .recommend(thin > 0, "collect more history for patterns with fewer than 30 samples"))
}

fn statistical_significance(request: &ValidationRequest) -> ForecastResult<Check> {
    let values: Vec<f64> = request.all_patterns().filter_map(|p| p.significance).collect();
    if values.is_empty() {
        return Ok(Check::NotApplicable("no pattern carries a significance estimate"));
    }
    let mean = stats::mean(&values);
    let weak = values.iter().filter(|s| **s < 0.5).count();
    Ok(Check::scored(mean)
        .measure("mean_significance", mean)
        .measure("weak_patterns", weak as f64)
        .recommend(weak > 0, "treat weakly significant patterns as advisory only"))
}

/// Multipliers stay in a plausible band; monthly indices average near 1.
fn seasonal_logic(request: &ValidationRequest) -> ForecastResult<Check> {
    let patterns = require_patterns(request, ValidationScope::SeasonalLogic, 1)?;

    let implausible = patterns
        .iter()
        .filter(|p| !(PLAUSIBLE_MIN..=PLAUSIBLE_MAX).contains(&p.multiplier) || !p.multiplier.is_finite())
        .count();
    let plausibility = 1.0 - implausible as f64 / patterns.len() as f64;

    let monthly: Vec<f64> = patterns
        .iter()
        .flat_map(|p| p.keyed_multipliers.iter())
        .filter(|(k, _)| k.starts_with("month:"))
        .map(|(_, m)| *m)
        .collect();
    let month_drift = if monthly.len() >= 6 {
        (stats::mean(&monthly) - 1.0).abs()
    } else {
        0.0
    };

    let score = plausibility - month_drift.min(0.5);
    Ok(Check::scored(score)
        .measure("implausible_patterns", implausible as f64)
        .measure("monthly_index_drift", month_drift)
        .recommend(implausible > 0, "cap or re-learn multipliers outside the 0.2-5.0 band")
        .recommend(month_drift > 0.15, "renormalise monthly indices so they average to 1.0"))
}

/// Overlapping keyed multipliers should agree in direction and size.
fn cross_pattern_coherence(request: &ValidationRequest) -> ForecastResult<Check> {
    let mut by_key: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for p in request.all_patterns() {
        for (k, m) in &p.keyed_multipliers {
            by_key.entry(k.as_str()).or_default().push(*m);
        }
    }
    let overlaps: Vec<&Vec<f64>> = by_key.values().filter(|ms| ms.len() >= 2).collect();
    if overlaps.is_empty() {
        return Ok(Check::NotApplicable("no overlapping multiplier keys"));
    }

    let mut conflicts = 0usize;
    let mut agreement = Vec::with_capacity(overlaps.len());
    for ms in &overlaps {
        let up = ms.iter().any(|m| *m > 1.0);
        let down = ms.iter().any(|m| *m < 1.0);
        if up && down {
            conflicts += 1;
        }
        agreement.push((1.0 - stats::coefficient_of_variation(ms).abs()).max(0.0));
    }
    let direction = 1.0 - conflicts as f64 / overlaps.len() as f64;
    let score = 0.5 * direction + 0.5 * stats::mean(&agreement);

    Ok(Check::scored(score)
        .measure("overlapping_keys", overlaps.len() as f64)
        .measure("directional_conflicts", conflicts as f64)
        .recommend(conflicts > 0, "resolve patterns that disagree on the direction of an effect"))
}

/// z-score over log multipliers.
fn outlier_detection(request: &ValidationRequest) -> ForecastResult<Check> {
    let logs: Vec<f64> = request
        .all_patterns()
        .filter(|p| p.multiplier > 0.0 && p.multiplier.is_finite())
        .map(|p| p.multiplier.ln())
        .collect();
    if logs.len() < 3 {
        return Ok(Check::NotApplicable("fewer than three patterns"));
    }
    let mean = stats::mean(&logs);
    let sd = stats::stddev_sample(&logs);
    let outliers = if sd <= f64::EPSILON {
        0
    } else {
        logs.iter().filter(|l| ((*l - mean) / sd).abs() > OUTLIER_Z).count()
    };
    Ok(Check::scored(1.0 - outliers as f64 / logs.len() as f64)
        .measure("outliers", outliers as f64)
        .measure("log_multiplier_stddev", sd)
        .recommend(outliers > 0, "inspect outlying multipliers for data errors or one-off promotions"))
}

fn predictive_accuracy(request: &ValidationRequest) -> ForecastResult<Check> {
    if request.outcomes.is_empty() {
        return Ok(Check::NotApplicable("no actualized outcomes"));
    }
    let mut by_name: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for p in request.all_patterns() {
        by_name.entry(p.name.as_str()).or_default().push(p.multiplier);
    }

    let errors: Vec<f64> = request
        .outcomes
        .iter()
        .filter(|o| o.observed_multiplier > 0.0)
        .filter_map(|o| {
            let predicted = stats::mean(by_name.get(o.pattern.as_str())?);
            Some(((predicted - o.observed_multiplier) / o.observed_multiplier).abs())
        })
        .collect();
    if errors.is_empty() {
        return Ok(Check::NotApplicable("no outcome matches a validated pattern"));
    }
    let mape = stats::mean(&errors);
    Ok(Check::scored(1.0 - mape)
        .measure("mape", mape)
        .measure("matched_outcomes", errors.len() as f64)
        .recommend(mape > 0.25, "re-learn patterns whose realised effect drifted by more than 25%"))
}
