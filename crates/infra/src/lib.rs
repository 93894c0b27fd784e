//! Infrastructure layer: port adapters, background relearning, worker wiring.

pub mod cache;
pub mod config;
pub mod memory;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis_cache;
pub mod relearn;
pub mod run_store;

pub use cache::{CacheSweeperHandle, InMemoryCache};
pub use config::{WorkerConfig, WorkerConfigError};
pub use memory::{InMemoryModelStore, InMemoryPredictionLedger, InMemoryProductCatalog, InMemoryTransactionSource};
pub use postgres::PostgresTransactionSource;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
pub use relearn::{PatternRelearnRunner, PatternRelearnRunnerHandle, RelearnStats, RelearnTarget};
pub use run_store::InMemoryRunStore;
