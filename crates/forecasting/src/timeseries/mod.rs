//! Time-series extraction: transactions → observations → feature vectors.

pub mod extractor;
pub mod features;
pub mod types;

pub use extractor::TimeSeriesExtractor;
pub use types::{
    DemandMetric, FeatureVector, Granularity, InventoryLevel, ObservationMetadata, ProductAttributes,
    TimeSeriesObservation, TimeSeriesRequest, TransactionKind, TransactionQuery, TransactionRecord,
};
