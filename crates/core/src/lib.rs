//! `stockcast-core` — shared building blocks for the forecasting workspace.
//!
//! This crate contains identifiers and the error taxonomy only (no IO).

pub mod error;
pub mod id;

pub use error::{ErrorKind, ForecastError, ForecastResult};
pub use id::{CategoryId, LocationId, ModelId, PredictionId, ProductId, RunId, TenantId};
