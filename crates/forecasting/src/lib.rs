//! `stockcast-forecasting` — the demand forecasting engine.
//!
//! Time-series extraction, calendar-event pattern learning, cross-pattern
//! validation, multi-scope integration, and model-backed prediction. All IO
//! goes through the ports in [`ports`]; adapters live in `stockcast-infra`.

pub mod config;
pub mod orchestration;
pub mod patterns;
pub mod ports;
pub mod prediction;
pub mod service;
pub mod stats;
pub mod timeseries;
pub mod validation;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, EngineConfig, ExtractorConfig, LearnerConfig, OrchestratorConfig, PredictorConfig};
pub use service::{EnginePorts, ForecastService, ServiceError, ServiceResponse};
