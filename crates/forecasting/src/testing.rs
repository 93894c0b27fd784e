//! In-crate fakes for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use stockcast_core::{ForecastError, ForecastResult, ProductId, RunId, TenantId};

use crate::patterns::{RunRecord, RunStore};
use crate::ports::{ArtifactReader, CacheStore, ModelRegistry, PredictionLedger, ProductCatalog, TransactionSource};
use crate::prediction::{ActualizedPrediction, ForecastModel, ModelArtifact};
use crate::timeseries::{InventoryLevel, ProductAttributes, TransactionQuery, TransactionRecord};

/// Returns the records matching each query, for any tenant.
pub struct StaticTransactions {
    records: Vec<TransactionRecord>,
}

impl StaticTransactions {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TransactionSource for StaticTransactions {
    async fn fetch_transactions(
        &self,
        _tenant_id: TenantId,
        query: &TransactionQuery,
    ) -> ForecastResult<Vec<TransactionRecord>> {
        Ok(self.records.iter().filter(|r| query.matches(r)).cloned().collect())
    }
}

pub struct FailingTransactions;

#[async_trait]
impl TransactionSource for FailingTransactions {
    async fn fetch_transactions(
        &self,
        _tenant_id: TenantId,
        _query: &TransactionQuery,
    ) -> ForecastResult<Vec<TransactionRecord>> {
        Err(ForecastError::storage("transaction store unreachable"))
    }
}

/// TTL-agnostic cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, JsonValue>>,
}

impl MemoryCache {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> ForecastResult<Option<JsonValue>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue, _ttl: Duration) -> ForecastResult<()> {
        self.entries.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ForecastResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<RunRecord>>,
}

impl RunStore for MemoryRunStore {
    fn save(&self, record: &RunRecord) -> ForecastResult<()> {
        let mut runs = self.runs.lock().unwrap();
        match runs.iter_mut().find(|r| r.tenant_id == record.tenant_id && r.run_id == record.run_id) {
            Some(existing) => *existing = record.clone(),
            None => runs.push(record.clone()),
        }
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, run_id: RunId) -> ForecastResult<Option<RunRecord>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.run_id == run_id)
            .cloned())
    }

    fn list(&self, tenant_id: TenantId, limit: usize) -> ForecastResult<Vec<RunRecord>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct StaticCatalog {
    products: BTreeMap<ProductId, (ProductAttributes, Vec<InventoryLevel>)>,
}

impl StaticCatalog {
    pub fn with_product(mut self, attrs: ProductAttributes, levels: Vec<InventoryLevel>) -> Self {
        self.products.insert(attrs.product_id, (attrs, levels));
        self
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn product_attributes(
        &self,
        _tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Option<ProductAttributes>> {
        Ok(self.products.get(&product_id).map(|(a, _)| a.clone()))
    }

    async fn inventory_levels(&self, _tenant_id: TenantId, product_id: ProductId) -> ForecastResult<Vec<InventoryLevel>> {
        Ok(self.products.get(&product_id).map(|(_, l)| l.clone()).unwrap_or_default())
    }
}

pub struct StaticRegistry {
    models: Vec<ForecastModel>,
}

impl StaticRegistry {
    pub fn new(models: Vec<ForecastModel>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl ModelRegistry for StaticRegistry {
    async fn list_models(&self, _tenant_id: TenantId) -> ForecastResult<Vec<ForecastModel>> {
        Ok(self.models.clone())
    }
}

/// Artifacts by reference, counting every load.
#[derive(Default)]
pub struct CountingArtifacts {
    artifacts: HashMap<String, ModelArtifact>,
    loads: AtomicUsize,
}

impl CountingArtifacts {
    pub fn with_artifact(mut self, artifact_ref: &str, artifact: ModelArtifact) -> Self {
        self.artifacts.insert(artifact_ref.to_string(), artifact);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactReader for CountingArtifacts {
    async fn load(&self, artifact_ref: &str) -> ForecastResult<ModelArtifact> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .get(artifact_ref)
            .cloned()
            .ok_or_else(|| ForecastError::storage(format!("artifact {artifact_ref} not found")))
    }
}

pub struct StaticLedger {
    entries: Vec<ActualizedPrediction>,
}

impl StaticLedger {
    pub fn new(entries: Vec<ActualizedPrediction>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl PredictionLedger for StaticLedger {
    async fn actualized(
        &self,
        _tenant_id: TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ForecastResult<Vec<ActualizedPrediction>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.target_date >= start && e.target_date <= end)
            .cloned()
            .collect())
    }
}
