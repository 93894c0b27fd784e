use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patterns::{PatternEffect, SeasonalBreakdown};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationScope {
    TemporalConsistency,
    ConfidenceAlignment,
    DataQuality,
    StatisticalSignificance,
    SeasonalLogic,
    CrossPatternCoherence,
    OutlierDetection,
    PredictiveAccuracy,
}

impl ValidationScope {
    pub const ALL: [ValidationScope; 8] = [
        ValidationScope::TemporalConsistency,
        ValidationScope::ConfidenceAlignment,
        ValidationScope::DataQuality,
        ValidationScope::StatisticalSignificance,
        ValidationScope::SeasonalLogic,
        ValidationScope::CrossPatternCoherence,
        ValidationScope::OutlierDetection,
        ValidationScope::PredictiveAccuracy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationScope::TemporalConsistency => "temporal_consistency",
            ValidationScope::ConfidenceAlignment => "confidence_alignment",
            ValidationScope::DataQuality => "data_quality",
            ValidationScope::StatisticalSignificance => "statistical_significance",
            ValidationScope::SeasonalLogic => "seasonal_logic",
            ValidationScope::CrossPatternCoherence => "cross_pattern_coherence",
            ValidationScope::OutlierDetection => "outlier_detection",
            ValidationScope::PredictiveAccuracy => "predictive_accuracy",
        }
    }
}

/// Normalised view of one learned pattern, whatever produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvidence {
    pub name: String,
    pub multiplier: f64,
    pub confidence: f64,
    pub sample_size: u64,
    pub occurrences: u32,
    pub significance: Option<f64>,
    pub breakdown: Option<SeasonalBreakdown>,
    /// Multipliers keyed `category:*`, `month:*` or `weekday:*`.
    pub keyed_multipliers: BTreeMap<String, f64>,
}

impl PatternEvidence {
    pub fn new(name: impl Into<String>, multiplier: f64, confidence: f64, sample_size: u64) -> Self {
        Self {
            name: name.into(),
            multiplier,
            confidence,
            sample_size,
            occurrences: 1,
            significance: None,
            breakdown: None,
            keyed_multipliers: BTreeMap::new(),
        }
    }

    pub fn with_occurrences(mut self, occurrences: u32) -> Self {
        self.occurrences = occurrences;
        self
    }

    pub fn with_significance(mut self, significance: f64) -> Self {
        self.significance = Some(significance);
        self
    }

    pub fn with_breakdown(mut self, breakdown: SeasonalBreakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn with_keyed(mut self, key: impl Into<String>, multiplier: f64) -> Self {
        self.keyed_multipliers.insert(key.into(), multiplier);
        self
    }
}

impl From<&PatternEffect> for PatternEvidence {
    fn from(e: &PatternEffect) -> Self {
        Self {
            name: e.event_name.clone(),
            multiplier: e.multiplier,
            confidence: e.confidence,
            sample_size: e.sample_size,
            occurrences: e.occurrences,
            significance: Some(e.provenance.significance),
            breakdown: Some(e.seasonal_breakdown.clone()),
            keyed_multipliers: e
                .category_multipliers
                .iter()
                .map(|(slug, m)| (format!("category:{slug}"), *m))
                .collect(),
        }
    }
}

/// Patterns produced by one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    pub source: String,
    pub patterns: Vec<PatternEvidence>,
}

impl PatternSet {
    pub fn new(source: impl Into<String>, patterns: Vec<PatternEvidence>) -> Self {
        Self {
            source: source.into(),
            patterns,
        }
    }

    pub fn from_effects(source: impl Into<String>, effects: &[PatternEffect]) -> Self {
        Self::new(source, effects.iter().map(PatternEvidence::from).collect())
    }
}

/// A realised multiplier to score a pattern against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOutcome {
    pub pattern: String,
    pub observed_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub pattern_sets: Vec<PatternSet>,
    /// Empty runs every scope.
    pub scopes: Vec<ValidationScope>,
    pub outcomes: Vec<ObservedOutcome>,
}

impl ValidationRequest {
    pub fn new(pattern_sets: Vec<PatternSet>) -> Self {
        Self {
            pattern_sets,
            scopes: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: &[ValidationScope]) -> Self {
        self.scopes = scopes.to_vec();
        self
    }

    pub fn with_outcomes(mut self, outcomes: Vec<ObservedOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub(crate) fn all_patterns(&self) -> impl Iterator<Item = &PatternEvidence> {
        self.pattern_sets.iter().flat_map(|s| s.patterns.iter())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Warning,
    Failed,
    NotApplicable,
}

impl ValidationStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            ValidationStatus::Passed
        } else if score >= 0.5 {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeValidation {
    pub scope: ValidationScope,
    pub status: ValidationStatus,
    pub score: f64,
    pub measurements: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
    /// Set when the check itself errored and the entry is a degraded default.
    pub error: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Failed,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            QualityGrade::Excellent
        } else if score >= 0.75 {
            QualityGrade::Good
        } else if score >= 0.6 {
            QualityGrade::Acceptable
        } else if score >= 0.4 {
            QualityGrade::Poor
        } else {
            QualityGrade::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub scopes: Vec<ScopeValidation>,
    pub overall_score: f64,
    pub grade: QualityGrade,
    /// Score of the data-quality scope when it ran, else the overall score.
    pub data_quality: f64,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn scope(&self, scope: ValidationScope) -> Option<&ScopeValidation> {
        self.scopes.iter().find(|s| s.scope == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_buckets() {
        assert_eq!(QualityGrade::from_score(0.95), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_score(0.9), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_score(0.8), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(0.6), QualityGrade::Acceptable);
        assert_eq!(QualityGrade::from_score(0.45), QualityGrade::Poor);
        assert_eq!(QualityGrade::from_score(0.1), QualityGrade::Failed);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(ValidationStatus::from_score(0.75), ValidationStatus::Passed);
        assert_eq!(ValidationStatus::from_score(0.5), ValidationStatus::Warning);
        assert_eq!(ValidationStatus::from_score(0.49), ValidationStatus::Failed);
    }
}
