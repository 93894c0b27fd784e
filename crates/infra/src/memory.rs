//! In-memory implementations of the engine's data ports, for tests and dev.
//!
//! Every store is keyed by tenant, so one instance can back many tenants
//! without any cross-tenant reads.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use stockcast_core::{ForecastError, ForecastResult, ProductId, TenantId};
use stockcast_forecasting::ports::{
    ArtifactReader, ModelRegistry, PredictionLedger, ProductCatalog, TransactionSource,
};
use stockcast_forecasting::prediction::{ActualizedPrediction, ForecastModel, ModelArtifact};
use stockcast_forecasting::timeseries::{InventoryLevel, ProductAttributes, TransactionQuery, TransactionRecord};

fn poisoned(what: &str) -> ForecastError {
    ForecastError::storage(format!("{what} lock poisoned"))
}

/// Tenant-isolated transaction history.
#[derive(Debug, Default)]
pub struct InMemoryTransactionSource {
    inner: RwLock<HashMap<TenantId, Vec<TransactionRecord>>>,
}

impl InMemoryTransactionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tenant_id: TenantId, records: impl IntoIterator<Item = TransactionRecord>) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(tenant_id).or_default().extend(records);
        }
    }

    pub fn len(&self, tenant_id: TenantId) -> usize {
        self.inner
            .read()
            .map(|m| m.get(&tenant_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl TransactionSource for InMemoryTransactionSource {
    async fn fetch_transactions(
        &self,
        tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> ForecastResult<Vec<TransactionRecord>> {
        let map = self.inner.read().map_err(|_| poisoned("transaction"))?;
        Ok(map
            .get(&tenant_id)
            .map(|records| records.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}

/// Product attributes and stock levels per tenant.
#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    attributes: RwLock<HashMap<(TenantId, ProductId), ProductAttributes>>,
    levels: RwLock<HashMap<(TenantId, ProductId), Vec<InventoryLevel>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, tenant_id: TenantId, attributes: ProductAttributes) {
        if let Ok(mut map) = self.attributes.write() {
            map.insert((tenant_id, attributes.product_id), attributes);
        }
    }

    /// Replaces every level of the product.
    pub fn set_levels(&self, tenant_id: TenantId, product_id: ProductId, levels: Vec<InventoryLevel>) {
        if let Ok(mut map) = self.levels.write() {
            map.insert((tenant_id, product_id), levels);
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn product_attributes(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Option<ProductAttributes>> {
        let map = self.attributes.read().map_err(|_| poisoned("catalog"))?;
        Ok(map.get(&(tenant_id, product_id)).cloned())
    }

    async fn inventory_levels(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Vec<InventoryLevel>> {
        let map = self.levels.read().map_err(|_| poisoned("inventory"))?;
        Ok(map.get(&(tenant_id, product_id)).cloned().unwrap_or_default())
    }
}

/// Model registry plus artifact storage, as written by a training pipeline.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<TenantId, Vec<ForecastModel>>>,
    artifacts: RwLock<HashMap<String, ModelArtifact>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces, by id) a model and stores its artifact under `model.artifact_ref`.
    pub fn register(&self, tenant_id: TenantId, model: ForecastModel, artifact: ModelArtifact) {
        if let Ok(mut artifacts) = self.artifacts.write() {
            artifacts.insert(model.artifact_ref.clone(), artifact);
        }
        if let Ok(mut models) = self.models.write() {
            let list = models.entry(tenant_id).or_default();
            list.retain(|m| m.id != model.id);
            list.push(model);
        }
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelStore {
    async fn list_models(&self, tenant_id: TenantId) -> ForecastResult<Vec<ForecastModel>> {
        let map = self.models.read().map_err(|_| poisoned("model registry"))?;
        Ok(map.get(&tenant_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ArtifactReader for InMemoryModelStore {
    async fn load(&self, artifact_ref: &str) -> ForecastResult<ModelArtifact> {
        let map = self.artifacts.read().map_err(|_| poisoned("artifact"))?;
        map.get(artifact_ref)
            .cloned()
            .ok_or_else(|| ForecastError::storage(format!("artifact not found: {artifact_ref}")))
    }
}

/// Predictions with their actuals attached.
#[derive(Debug, Default)]
pub struct InMemoryPredictionLedger {
    inner: RwLock<HashMap<TenantId, Vec<ActualizedPrediction>>>,
}

impl InMemoryPredictionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, tenant_id: TenantId, entry: ActualizedPrediction) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(tenant_id).or_default().push(entry);
        }
    }
}

#[async_trait]
impl PredictionLedger for InMemoryPredictionLedger {
    async fn actualized(
        &self,
        tenant_id: TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ForecastResult<Vec<ActualizedPrediction>> {
        let map = self.inner.read().map_err(|_| poisoned("ledger"))?;
        Ok(map
            .get(&tenant_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.target_date >= start && e.target_date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
