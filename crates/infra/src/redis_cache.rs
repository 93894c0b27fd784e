//! Redis-backed cache (feature `redis`).
//!
//! Values are stored as JSON strings with a native `PX` expiry, so Redis owns
//! eviction. Commands run on the blocking pool because the client connection
//! is synchronous.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::instrument;

use stockcast_core::{ForecastError, ForecastResult};
use stockcast_forecasting::ports::CacheStore;

const DEFAULT_KEY_PREFIX: &str = "stockcast";

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
    prefix: String,
}

impl RedisCache {
    /// `redis_url` e.g. `redis://localhost:6379`.
    pub fn new(redis_url: impl AsRef<str>) -> ForecastResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ForecastError::storage(format!("redis connection error: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> ForecastResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| ForecastError::storage(format!("redis connection error in {operation}: {e}")))?;
            f(&mut conn).map_err(|e| ForecastError::storage(format!("redis command error in {operation}: {e}")))
        })
        .await
        .map_err(|e| ForecastError::storage(format!("redis task failed in {operation}: {e}")))?
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    #[instrument(skip(self), err)]
    async fn get(&self, key: &str) -> ForecastResult<Option<JsonValue>> {
        let key = self.namespaced(key);
        let raw: Option<String> = self
            .run("get", move |conn| redis::cmd("GET").arg(&key).query(conn))
            .await?;
        match raw {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| ForecastError::storage(format!("undecodable cache entry: {e}"))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), err)]
    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) -> ForecastResult<()> {
        let millis = ttl.as_millis().min(u64::MAX as u128) as u64;
        if millis == 0 {
            return Ok(());
        }
        let key = self.namespaced(key);
        let payload = serde_json::to_string(&value)?;
        self.run("set", move |conn| {
            redis::cmd("SET")
                .arg(&key)
                .arg(payload)
                .arg("PX")
                .arg(millis)
                .query::<()>(conn)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> ForecastResult<()> {
        let key = self.namespaced(key);
        self.run("delete", move |conn| redis::cmd("DEL").arg(&key).query::<()>(conn))
            .await
    }
}
