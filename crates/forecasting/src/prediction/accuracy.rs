//! Accuracy diagnostics over actualized predictions.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use stockcast_core::{ForecastError, ForecastResult, ModelId, TenantId};
use stockcast_events::{Notification, NotificationKind, NotificationSink};

use crate::ports::PredictionLedger;
use crate::prediction::types::{ActualizedPrediction, ModelType};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AccuracyGrade {
    /// From MAPE in percent.
    pub fn from_mape(mape: f64) -> Self {
        if mape < 10.0 {
            AccuracyGrade::Excellent
        } else if mape < 20.0 {
            AccuracyGrade::Good
        } else if mape < 30.0 {
            AccuracyGrade::Fair
        } else {
            AccuracyGrade::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub evaluated: usize,
    /// Percent; zero actuals are excluded, and all-zero actuals score 100.
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Mean of `predicted - actual`; positive means over-forecasting.
    pub bias: f64,
    /// Share of actuals inside the predicted bounds.
    pub interval_coverage: f64,
    pub grade: AccuracyGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub model_id: ModelId,
    pub model_type: ModelType,
    pub metrics: AccuracyMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Entries with a non-finite or negative actual.
    pub skipped: usize,
    pub overall: AccuracyMetrics,
    pub per_model: Vec<ModelAccuracy>,
}

/// Metrics over a non-empty set of usable entries.
pub fn metrics(entries: &[&ActualizedPrediction]) -> Option<AccuracyMetrics> {
    if entries.is_empty() {
        return None;
    }
    let n = entries.len() as f64;

    let nonzero: Vec<f64> = entries
        .iter()
        .filter(|e| e.actual != 0.0)
        .map(|e| ((e.actual - e.predicted) / e.actual).abs())
        .collect();
    let mape = if nonzero.is_empty() {
        100.0
    } else {
        nonzero.iter().sum::<f64>() / nonzero.len() as f64 * 100.0
    };

    let mae = entries.iter().map(|e| (e.predicted - e.actual).abs()).sum::<f64>() / n;
    let rmse = (entries.iter().map(|e| (e.predicted - e.actual).powi(2)).sum::<f64>() / n).sqrt();
    let bias = entries.iter().map(|e| e.predicted - e.actual).sum::<f64>() / n;
    let covered = entries
        .iter()
        .filter(|e| e.lower_bound <= e.actual && e.actual <= e.upper_bound)
        .count();

    Some(AccuracyMetrics {
        evaluated: entries.len(),
        mape,
        mae,
        rmse,
        bias,
        interval_coverage: covered as f64 / n,
        grade: AccuracyGrade::from_mape(mape),
    })
}

/// Scores stored predictions against their actuals.
#[derive(Clone)]
pub struct AccuracyValidator {
    ledger: Arc<dyn PredictionLedger>,
    notifier: Arc<dyn NotificationSink>,
}

impl AccuracyValidator {
    pub fn new(ledger: Arc<dyn PredictionLedger>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn validate_predictions(
        &self,
        tenant_id: TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ForecastResult<AccuracyReport> {
        if start > end {
            return Err(ForecastError::validation("accuracy range start is after end"));
        }

        let actualized = self.ledger.actualized(tenant_id, start, end).await?;
        let (usable, skipped): (Vec<&ActualizedPrediction>, Vec<&ActualizedPrediction>) = actualized
            .iter()
            .filter(|a| a.target_date >= start && a.target_date <= end)
            .partition(|a| a.actual.is_finite() && a.actual >= 0.0 && a.predicted.is_finite());

        let Some(overall) = metrics(&usable) else {
            return Err(ForecastError::insufficient("accuracy validation", 1, 0));
        };

        let mut by_model: BTreeMap<ModelId, (ModelType, Vec<&ActualizedPrediction>)> = BTreeMap::new();
        for &a in &usable {
            by_model.entry(a.model_id).or_insert_with(|| (a.model_type, Vec::new())).1.push(a);
        }
        let per_model = by_model
            .into_iter()
            .filter_map(|(model_id, (model_type, entries))| {
                metrics(&entries).map(|metrics| ModelAccuracy {
                    model_id,
                    model_type,
                    metrics,
                })
            })
            .collect();

        let report = AccuracyReport {
            start,
            end,
            skipped: skipped.len(),
            overall,
            per_model,
        };
        self.notifier.notify(Notification::new(
            tenant_id,
            NotificationKind::AccuracyReportGenerated,
            json!({
                "start": start,
                "end": end,
                "evaluated": report.overall.evaluated,
                "mape": report.overall.mape,
            }),
        ));
        info!(
            tenant = %tenant_id,
            evaluated = report.overall.evaluated,
            mape = report.overall.mape,
            grade = ?report.overall.grade,
            "accuracy report generated"
        );
        Ok(report)
    }
}
