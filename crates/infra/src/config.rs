//! Worker process configuration.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use stockcast_core::TenantId;
use stockcast_forecasting::patterns::BusinessType;

use crate::relearn::RelearnTarget;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("invalid tenant entry {entry:?}: {reason}")]
    InvalidTenant { entry: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Postgres transaction store; in-memory when unset.
    pub database_url: Option<String>,
    /// Redis cache; in-memory when unset or when built without `redis`.
    pub redis_url: Option<String>,
    pub relearn_interval: Duration,
    pub cache_sweep_interval: Duration,
    pub max_db_connections: u32,
    pub tenants: Vec<RelearnTarget>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            relearn_interval: Duration::from_secs(24 * 60 * 60),
            cache_sweep_interval: Duration::from_secs(60),
            max_db_connections: 5,
            tenants: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `DATABASE_URL`, `REDIS_URL`, `STOCKCAST_RELEARN_INTERVAL_SECS`,
    /// `STOCKCAST_CACHE_SWEEP_SECS`, `STOCKCAST_DB_MAX_CONNECTIONS` and
    /// `STOCKCAST_TENANTS` (`uuid:business_type[:region]`, comma separated).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        cfg.database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        cfg.redis_url = lookup("REDIS_URL").filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("STOCKCAST_RELEARN_INTERVAL_SECS") {
            let secs: u64 = parse("STOCKCAST_RELEARN_INTERVAL_SECS", &v)?;
            if secs == 0 {
                return Err(invalid("STOCKCAST_RELEARN_INTERVAL_SECS", &v));
            }
            cfg.relearn_interval = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("STOCKCAST_CACHE_SWEEP_SECS") {
            let secs: u64 = parse("STOCKCAST_CACHE_SWEEP_SECS", &v)?;
            cfg.cache_sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(v) = lookup("STOCKCAST_DB_MAX_CONNECTIONS") {
            cfg.max_db_connections = parse("STOCKCAST_DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("STOCKCAST_TENANTS") {
            cfg.tenants = v
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(parse_tenant)
                .collect::<Result<_, _>>()?;
        }
        Ok(cfg)
    }
}

fn parse_tenant(entry: &str) -> Result<RelearnTarget, WorkerConfigError> {
    let reject = |reason: &str| WorkerConfigError::InvalidTenant {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };
    let mut parts = entry.splitn(3, ':');
    let id = parts.next().unwrap_or_default();
    let uuid = Uuid::parse_str(id).map_err(|_| reject("tenant id is not a uuid"))?;
    let business_type = match parts.next() {
        Some(raw) => BusinessType::parse(raw).ok_or_else(|| reject("unknown business type"))?,
        None => BusinessType::General,
    };
    let mut target = RelearnTarget::new(TenantId::from_uuid(uuid), business_type);
    if let Some(region) = parts.next().map(str::trim).filter(|r| !r.is_empty()) {
        target = target.with_region(region);
    }
    Ok(target)
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, WorkerConfigError> {
    raw.trim().parse().map_err(|_| invalid(key, raw))
}

fn invalid(key: &str, raw: &str) -> WorkerConfigError {
    WorkerConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = WorkerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, WorkerConfig::default());
    }

    #[test]
    fn parses_tenants_and_interval() {
        let id = Uuid::now_v7();
        let raw = format!("{id}:grocery:jakarta, {id}");
        let cfg = WorkerConfig::from_lookup(lookup_from(&[
            ("STOCKCAST_TENANTS", raw.as_str()),
            ("STOCKCAST_RELEARN_INTERVAL_SECS", "3600"),
            ("DATABASE_URL", "postgres://localhost/stockcast"),
            ("REDIS_URL", " "),
        ]))
        .unwrap();
        assert_eq!(cfg.relearn_interval, Duration::from_secs(3600));
        assert_eq!(cfg.tenants.len(), 2);
        assert_eq!(cfg.tenants[0].business_type, BusinessType::Grocery);
        assert_eq!(cfg.tenants[0].region.as_deref(), Some("jakarta"));
        assert_eq!(cfg.tenants[1].business_type, BusinessType::General);
        assert!(cfg.database_url.is_some());
        assert!(cfg.redis_url.is_none());
    }

    #[test]
    fn rejects_bad_entries() {
        assert!(matches!(
            WorkerConfig::from_lookup(lookup_from(&[("STOCKCAST_TENANTS", "nope:grocery")])),
            Err(WorkerConfigError::InvalidTenant { .. })
        ));
        assert!(matches!(
            WorkerConfig::from_lookup(lookup_from(&[("STOCKCAST_RELEARN_INTERVAL_SECS", "0")])),
            Err(WorkerConfigError::InvalidValue { .. })
        ));
    }
}
