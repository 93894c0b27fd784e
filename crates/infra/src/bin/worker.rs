//! `stockcast-worker`: keeps learned event effects fresh for every configured tenant.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stockcast_events::{InMemoryNotificationBus, NotificationSink};
use stockcast_forecasting::EngineConfig;
use stockcast_forecasting::patterns::{PatternLearner, RamadanPatternLearner};
use stockcast_forecasting::ports::{CacheStore, TransactionSource};
use stockcast_infra::{
    InMemoryCache, InMemoryRunStore, InMemoryTransactionSource, PatternRelearnRunner, PostgresTransactionSource,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockcast_observability::init_with(&stockcast_observability::ObservabilityConfig::from_env());

    let worker = WorkerConfig::from_env().context("invalid worker configuration")?;
    let engine = EngineConfig::from_env().context("invalid engine configuration")?;

    let transactions: Arc<dyn TransactionSource> = match &worker.database_url {
        Some(url) => Arc::new(
            PostgresTransactionSource::connect(url, worker.max_db_connections)
                .await
                .context("failed to connect to the transaction database")?,
        ),
        None => {
            warn!("DATABASE_URL not set; using an empty in-memory transaction store");
            Arc::new(InMemoryTransactionSource::new())
        }
    };

    let memory_cache = Arc::new(InMemoryCache::new());
    let cache = select_cache(&worker, &memory_cache)?;
    let sweeper = memory_cache.spawn_sweeper(worker.cache_sweep_interval);

    let notifier: Arc<dyn NotificationSink> = Arc::new(InMemoryNotificationBus::new());
    let ramadan = Arc::new(RamadanPatternLearner::new(
        Arc::clone(&transactions),
        Arc::clone(&cache),
        engine.learner.clone(),
    ));
    let learner = PatternLearner::new(
        transactions,
        cache,
        InMemoryRunStore::arc(),
        notifier,
        engine.learner.clone(),
    )
    .with_specialized(ramadan);

    if worker.tenants.is_empty() {
        warn!("STOCKCAST_TENANTS is empty; nothing to relearn");
    }

    let runner = PatternRelearnRunner {
        interval: worker.relearn_interval,
        ..PatternRelearnRunner::default()
    };
    let handles: Vec<_> = worker
        .tenants
        .iter()
        .cloned()
        .map(|target| runner.spawn_for_tenant("pattern-relearn", target, learner.clone()))
        .collect();
    info!(
        tenants = handles.len(),
        interval_secs = worker.relearn_interval.as_secs(),
        "stockcast worker started"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    for handle in handles {
        let stats = handle.shutdown().await;
        info!(runs = stats.runs, succeeded = stats.succeeded, failed = stats.failed, "runner stopped");
    }
    sweeper.shutdown().await;
    Ok(())
}

#[cfg(feature = "redis")]
fn select_cache(worker: &WorkerConfig, memory: &Arc<InMemoryCache>) -> anyhow::Result<Arc<dyn CacheStore>> {
    match &worker.redis_url {
        Some(url) => {
            let cache = stockcast_infra::RedisCache::new(url).context("failed to open redis client")?;
            info!("using redis cache");
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::clone(memory) as Arc<dyn CacheStore>),
    }
}

#[cfg(not(feature = "redis"))]
fn select_cache(worker: &WorkerConfig, memory: &Arc<InMemoryCache>) -> anyhow::Result<Arc<dyn CacheStore>> {
    if worker.redis_url.is_some() {
        warn!("REDIS_URL set but built without the `redis` feature; using in-memory cache");
    }
    Ok(Arc::clone(memory) as Arc<dyn CacheStore>)
}
