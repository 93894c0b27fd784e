//! Forecasting error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the forecasting layers.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Forecasting error taxonomy.
///
/// - `Validation` is surfaced immediately and never retried.
/// - `DataInsufficiency` downgrades a scope/event to "skipped".
/// - `ModelUnavailable` is surfaced to the caller; no fallback model is synthesized.
/// - `Computation` is caught at a sub-analysis boundary and turned into a degraded entry.
/// - `Storage` wraps failures of external collaborators (transaction store, cache, registry).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    /// Malformed input (bad date range, zero horizon, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough history to compute a result.
    #[error("insufficient data for {scope}: need {required}, got {actual}")]
    DataInsufficiency {
        scope: String,
        required: usize,
        actual: usize,
    },

    /// No deployed model matches the request.
    #[error("no deployed model available: {0}")]
    ModelUnavailable(String),

    /// Unexpected failure inside one computation.
    #[error("computation failed: {0}")]
    Computation(String),

    /// An external collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Stable, serialisable error category (used in service responses and notifications).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DataInsufficiency,
    ModelUnavailable,
    Computation,
    Storage,
}

impl ForecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient(scope: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::DataInsufficiency {
            scope: scope.into(),
            required,
            actual,
        }
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::Validation(_) => ErrorKind::Validation,
            ForecastError::DataInsufficiency { .. } => ErrorKind::DataInsufficiency,
            ForecastError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            ForecastError::Computation(_) => ErrorKind::Computation,
            ForecastError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ForecastError::Validation(_))
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(value: serde_json::Error) -> Self {
        Self::Computation(format!("serialization: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ForecastError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            ForecastError::insufficient("holiday_events", 3, 1).kind(),
            ErrorKind::DataInsufficiency
        );
        assert_eq!(ForecastError::storage("down").kind(), ErrorKind::Storage);
    }

    #[test]
    fn insufficiency_message_names_scope() {
        let err = ForecastError::insufficient("trend", 14, 3);
        assert_eq!(err.to_string(), "insufficient data for trend: need 14, got 3");
    }
}
