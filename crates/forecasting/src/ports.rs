//! Consumed collaborators.
//!
//! The engine is storage-agnostic: adapters (in-memory, Postgres, Redis) live
//! in `stockcast-infra`. All async ports are object-safe via `async_trait` so
//! the engine can hold them as `Arc<dyn Port>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use stockcast_core::{ForecastResult, ProductId, TenantId};

use crate::prediction::{ActualizedPrediction, ForecastModel, ModelArtifact};
use crate::timeseries::{InventoryLevel, ProductAttributes, TransactionQuery, TransactionRecord};

/// Transactional history, queryable by tenant/date-range/product filters.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> ForecastResult<Vec<TransactionRecord>>;
}

/// Static product attributes and current stock levels.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product_attributes(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Option<ProductAttributes>>;

    async fn inventory_levels(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Vec<InventoryLevel>>;
}

/// Key-value cache with per-entry TTL.
///
/// Values are JSON so the trait stays object-safe; use [`cache_get`] and
/// [`cache_set`] for typed access.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> ForecastResult<Option<JsonValue>>;

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) -> ForecastResult<()>;

    async fn delete(&self, key: &str) -> ForecastResult<()>;
}

/// Registry of trained models (owned by the external training pipeline).
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn list_models(&self, tenant_id: TenantId) -> ForecastResult<Vec<ForecastModel>>;
}

/// Reads a trained model artifact given its reference.
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    async fn load(&self, artifact_ref: &str) -> ForecastResult<ModelArtifact>;
}

/// Long-term prediction storage, with ground truth attached by an external job.
#[async_trait]
pub trait PredictionLedger: Send + Sync {
    async fn actualized(
        &self,
        tenant_id: TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ForecastResult<Vec<ActualizedPrediction>>;
}

/// Typed cache read. Cache failures and undecodable payloads count as a miss.
pub async fn cache_get<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "cache read failed; treating as miss");
            None
        }
    }
}

/// Typed cache write. Failures are logged, never propagated.
pub async fn cache_set<T: Serialize>(cache: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    if ttl.is_zero() {
        return;
    }
    let json = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to encode cache entry");
            return;
        }
    };
    if let Err(e) = cache.set(key, json, ttl).await {
        tracing::warn!(key, error = %e, "cache write failed");
    }
}

/// Stable cache key: `{prefix}:{tenant}:{blake3(json(request))}`.
///
/// Requests must serialise deterministically (structs + ordered maps).
pub fn signature_key<T: Serialize>(prefix: &str, tenant_id: TenantId, request: &T) -> ForecastResult<String> {
    let bytes = serde_json::to_vec(request)?;
    Ok(format!("{prefix}:{tenant_id}:{}", blake3::hash(&bytes).to_hex()))
}
