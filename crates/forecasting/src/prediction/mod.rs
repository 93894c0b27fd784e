//! Model selection, prediction and accuracy diagnostics.

pub mod accuracy;
pub mod predictor;
pub mod selector;
pub mod types;

pub use accuracy::{AccuracyGrade, AccuracyMetrics, AccuracyReport, AccuracyValidator, ModelAccuracy};
pub use predictor::Predictor;
pub use selector::ModelSelector;
pub use types::{
    ActualizedPrediction, BusinessImpact, ForecastModel, ForecastPoint, InsightKind, InsightSeverity, ModelArtifact,
    ModelStatus, ModelType, PatternContext, Prediction, PredictionInsight, PredictionOutcome, PredictionRequest,
    PredictionType, RiskLevel,
};
