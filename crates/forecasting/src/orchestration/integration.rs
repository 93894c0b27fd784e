//! Weighting, insight extraction and conflict resolution over scope analyses.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::orchestration::types::{
    ConflictCandidate, ConflictRecord, ConflictResolution, IntegratedInsight, PatternScope,
    PrioritizationStrategy, Recommendation, RecommendationPriority, ScopeAnalysis, ScopeContribution,
};
use crate::stats;

/// Upper bound on the integrated confidence.
pub const MAX_OVERALL_CONFIDENCE: f64 = 0.95;

fn impact_factor(a: &ScopeAnalysis) -> f64 {
    0.5 + a.business_impact().min(1.0)
}

fn recency_factor(a: &ScopeAnalysis, as_of: NaiveDate) -> f64 {
    match a.latest_observation {
        Some(latest) => {
            let age = (as_of - latest).num_days().max(0) as f64;
            (1.0 - age / 365.0).max(0.5)
        }
        None => 0.5,
    }
}

/// Weight of one scope under `strategy`.
pub fn scope_weight(strategy: &PrioritizationStrategy, a: &ScopeAnalysis, as_of: NaiveDate) -> f64 {
    let base = a.scope.default_weight();
    match strategy {
        PrioritizationStrategy::ConfidenceWeighted => base,
        PrioritizationStrategy::BusinessImpact => base * impact_factor(a),
        PrioritizationStrategy::RecencyWeighted => base * recency_factor(a, as_of),
        PrioritizationStrategy::Balanced => base * (1.0 + impact_factor(a) + recency_factor(a, as_of)) / 3.0,
        PrioritizationStrategy::Custom(weights) => weights.get(&a.scope).copied().unwrap_or(base),
    }
}

/// `confidence x weight` per analysis, highest first.
pub fn contributions(
    analyses: &[ScopeAnalysis],
    strategy: &PrioritizationStrategy,
    as_of: NaiveDate,
) -> Vec<ScopeContribution> {
    let mut out: Vec<ScopeContribution> = analyses
        .iter()
        .map(|a| {
            let weight = scope_weight(strategy, a, as_of);
            ScopeContribution {
                scope: a.scope,
                confidence: a.confidence,
                weight,
                contribution_score: a.confidence * weight,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.contribution_score
            .total_cmp(&a.contribution_score)
            .then(a.scope.cmp(&b.scope))
    });
    out
}

pub fn insights(
    analyses: &[ScopeAnalysis],
    contributions: &[ScopeContribution],
    threshold: f64,
) -> Vec<IntegratedInsight> {
    contributions
        .iter()
        .filter(|c| c.confidence > threshold)
        .filter_map(|c| {
            let a = analyses.iter().find(|a| a.scope == c.scope)?;
            let headline = match a.strongest() {
                Some((key, m)) => format!("{}: {} ({key} at {m:.2}x)", a.scope.as_str(), a.summary),
                None => format!("{}: {}", a.scope.as_str(), a.summary),
            };
            Some(IntegratedInsight {
                scope: c.scope,
                headline,
                confidence: c.confidence,
                contribution_score: c.contribution_score,
            })
        })
        .collect()
}

fn action_for(scope: PatternScope, strongest: Option<(&str, f64)>) -> String {
    let (key, m) = strongest.unwrap_or(("baseline", 1.0));
    let direction = if m >= 1.0 { "raise" } else { "lower" };
    match scope {
        PatternScope::HolidayEvents => format!("{direction} stock ahead of {key} by {:.0}%", (m - 1.0).abs() * 100.0),
        PatternScope::Ramadan => format!("plan Ramadan replenishment around {key} ({m:.2}x)"),
        PatternScope::DayOfWeek => format!("schedule deliveries before {key} ({m:.2}x)"),
        PatternScope::PaydayCycle => format!("{direction} orders for the payday window ({m:.2}x)"),
        PatternScope::MonthlySeasonality => format!("{direction} monthly targets for {key} ({m:.2}x)"),
        PatternScope::Trend => format!("{direction} baseline order quantities to follow the trend ({m:.2}x/week)"),
        PatternScope::CategoryMix => format!("rebalance assortment toward {key} ({m:.2}x)"),
        PatternScope::Regional => format!("reallocate stock toward {key} ({m:.2}x)"),
        PatternScope::PromotionalSpikes => format!("keep safety stock for promotion spikes ({m:.2}x lift)"),
        PatternScope::WeatherSeason => format!("adjust seasonal stock for {key} ({m:.2}x)"),
    }
}

/// Recommendations derived from insights, highest contribution first.
pub fn recommendations(analyses: &[ScopeAnalysis], insights: &[IntegratedInsight]) -> Vec<Recommendation> {
    insights
        .iter()
        .filter_map(|i| {
            let a = analyses.iter().find(|a| a.scope == i.scope)?;
            let priority = if i.contribution_score >= 0.9 {
                RecommendationPriority::High
            } else if i.contribution_score >= 0.6 {
                RecommendationPriority::Medium
            } else {
                RecommendationPriority::Low
            };
            Some(Recommendation {
                scope: i.scope,
                priority,
                action: action_for(i.scope, a.strongest()),
                contribution_score: i.contribution_score,
            })
        })
        .collect()
}

/// Merge all multipliers; keys produced by more than one scope are resolved
/// with `method` and recorded.
pub fn resolve_conflicts(
    analyses: &[ScopeAnalysis],
    method: ConflictResolution,
) -> (BTreeMap<String, f64>, Vec<ConflictRecord>) {
    let mut by_key: BTreeMap<&str, Vec<ConflictCandidate>> = BTreeMap::new();
    for a in analyses {
        for (k, m) in &a.multipliers {
            by_key.entry(k.as_str()).or_default().push(ConflictCandidate {
                scope: a.scope,
                multiplier: *m,
                confidence: a.confidence,
            });
        }
    }

    let mut merged = BTreeMap::new();
    let mut conflicts = Vec::new();
    for (key, mut candidates) in by_key {
        if candidates.len() == 1 {
            merged.insert(key.to_string(), candidates[0].multiplier);
            continue;
        }
        candidates.sort_by(|a, b| a.scope.cmp(&b.scope));
        let resolved = resolve(&candidates, method);
        merged.insert(key.to_string(), resolved);
        conflicts.push(ConflictRecord {
            key: key.to_string(),
            candidates,
            resolved,
            method,
        });
    }
    (merged, conflicts)
}

fn resolve(candidates: &[ConflictCandidate], method: ConflictResolution) -> f64 {
    match method {
        ConflictResolution::ConfidenceWeighted => {
            let total: f64 = candidates.iter().map(|c| c.confidence).sum();
            if total <= f64::EPSILON {
                stats::mean(&candidates.iter().map(|c| c.multiplier).collect::<Vec<_>>())
            } else {
                candidates.iter().map(|c| c.multiplier * c.confidence).sum::<f64>() / total
            }
        }
        ConflictResolution::HighestConfidence => candidates
            .iter()
            .fold(None::<&ConflictCandidate>, |best, c| match best {
                Some(b) if b.confidence >= c.confidence => Some(b),
                _ => Some(c),
            })
            .map(|c| c.multiplier)
            .unwrap_or(1.0),
        ConflictResolution::Conservative => candidates
            .iter()
            .fold(None::<&ConflictCandidate>, |best, c| match best {
                Some(b) if (b.multiplier - 1.0).abs() <= (c.multiplier - 1.0).abs() => Some(b),
                _ => Some(c),
            })
            .map(|c| c.multiplier)
            .unwrap_or(1.0),
    }
}

/// `clamp(weighted mean confidence x data quality, 0, 0.95)`.
pub fn overall_confidence(contributions: &[ScopeContribution], data_quality: f64) -> f64 {
    if contributions.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = contributions.iter().map(|c| c.weight).sum();
    let weighted = if total_weight <= f64::EPSILON {
        stats::mean(&contributions.iter().map(|c| c.confidence).collect::<Vec<_>>())
    } else {
        contributions.iter().map(|c| c.confidence * c.weight).sum::<f64>() / total_weight
    };
    stats::clamp(weighted * data_quality, 0.0, MAX_OVERALL_CONFIDENCE)
}
