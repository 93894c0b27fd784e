//! TTL-aware in-memory cache.
//!
//! Entries expire lazily: a read past the deadline removes the entry and
//! reports a miss. [`InMemoryCache::spawn_sweeper`] additionally purges
//! expired entries on a fixed cadence so unread keys do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use stockcast_core::{ForecastError, ForecastResult};
use stockcast_forecasting::ports::CacheStore;

#[derive(Debug, Clone)]
struct Entry {
    value: JsonValue,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCache {
    inner: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .map(|m| m.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.inner.write() {
            Ok(mut map) => {
                let before = map.len();
                map.retain(|_, e| !e.is_expired(now));
                before - map.len()
            }
            Err(_) => 0,
        }
    }

    /// Purge expired entries every `every` until the handle is shut down or
    /// the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> CacheSweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let cache: Weak<Self> = Arc::downgrade(self);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, "cache sweep");
                        }
                    }
                }
            }
            info!("cache sweeper stopped");
        });

        CacheSweeperHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> ForecastResult<Option<JsonValue>> {
        let now = Instant::now();
        {
            let map = self
                .inner
                .read()
                .map_err(|_| ForecastError::storage("cache lock poisoned"))?;
            match map.get(key) {
                None => return Ok(None),
                Some(e) if !e.is_expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it unless a writer refreshed it meanwhile.
        if let Ok(mut map) = self.inner.write() {
            if map.get(key).is_some_and(|e| e.is_expired(now)) {
                map.remove(key);
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) -> ForecastResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let expires_at = Instant::now() + ttl;
        let mut map = self
            .inner
            .write()
            .map_err(|_| ForecastError::storage("cache lock poisoned"))?;
        map.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> ForecastResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| ForecastError::storage("cache lock poisoned"))?;
        map.remove(key);
        Ok(())
    }
}

/// Handle of a running sweeper.
#[derive(Debug)]
pub struct CacheSweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CacheSweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(j) = self.join.take() {
            let _ = j.await;
        }
    }
}
