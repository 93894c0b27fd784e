//! Run store implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockcast_core::{ForecastError, ForecastResult, RunId, TenantId};
use stockcast_forecasting::patterns::{RunRecord, RunState, RunStore};

/// In-memory run store for tests/dev.
///
/// Keeps at most `retain_per_tenant` runs per tenant; the oldest terminal runs
/// are evicted first.
#[derive(Debug)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<(TenantId, RunId), RunRecord>>,
    retain_per_tenant: usize,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            retain_per_tenant: 500,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_retention(mut self, retain_per_tenant: usize) -> Self {
        self.retain_per_tenant = retain_per_tenant.max(1);
        self
    }

    /// Runs of a tenant currently in `state`.
    pub fn count_in_state(&self, tenant_id: TenantId, state: RunState) -> usize {
        self.runs
            .read()
            .map(|m| {
                m.values()
                    .filter(|r| r.tenant_id == tenant_id && r.state == state)
                    .count()
            })
            .unwrap_or(0)
    }

    fn evict(&self, map: &mut HashMap<(TenantId, RunId), RunRecord>, tenant_id: TenantId) {
        let mut terminal: Vec<(DateTime<Utc>, RunId)> = map
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.state.is_terminal())
            .map(|r| (r.updated_at, r.run_id))
            .collect();
        let total = map.keys().filter(|(t, _)| *t == tenant_id).count();
        let excess = total.saturating_sub(self.retain_per_tenant);
        if excess == 0 {
            return;
        }
        terminal.sort();
        for (_, run_id) in terminal.into_iter().take(excess) {
            map.remove(&(tenant_id, run_id));
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore for InMemoryRunStore {
    fn save(&self, record: &RunRecord) -> ForecastResult<()> {
        let mut map = self
            .runs
            .write()
            .map_err(|_| ForecastError::storage("run store lock poisoned"))?;
        map.insert((record.tenant_id, record.run_id), record.clone());
        self.evict(&mut map, record.tenant_id);
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, run_id: RunId) -> ForecastResult<Option<RunRecord>> {
        let map = self
            .runs
            .read()
            .map_err(|_| ForecastError::storage("run store lock poisoned"))?;
        Ok(map.get(&(tenant_id, run_id)).cloned())
    }

    fn list(&self, tenant_id: TenantId, limit: usize) -> ForecastResult<Vec<RunRecord>> {
        let map = self
            .runs
            .read()
            .map_err(|_| ForecastError::storage("run store lock poisoned"))?;
        let mut result: Vec<RunRecord> = map
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        // UUIDv7 run ids are time-ordered.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.run_id.cmp(&a.run_id)));
        result.truncate(limit);
        Ok(result)
    }
}
