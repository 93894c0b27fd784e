//! Scheduled pattern relearning.
//!
//! One runner task per tenant re-learns event effects on a fixed cadence,
//! refreshing the effect cache the predictor reads through the dynamic
//! multiplier lookup. Failures are logged and retried with bounded exponential
//! backoff; they never propagate.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use stockcast_core::{CategoryId, TenantId};
use stockcast_forecasting::patterns::{BusinessType, PatternLearner, PatternLearningRequest};

/// What to relearn for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct RelearnTarget {
    pub tenant_id: TenantId,
    pub business_type: BusinessType,
    pub region: Option<String>,
    pub category_slugs: BTreeMap<CategoryId, String>,
}

impl RelearnTarget {
    pub fn new(tenant_id: TenantId, business_type: BusinessType) -> Self {
        Self {
            tenant_id,
            business_type,
            region: None,
            category_slugs: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_category_slug(mut self, category_id: CategoryId, slug: impl Into<String>) -> Self {
        self.category_slugs.insert(category_id, slug.into());
        self
    }

    fn request(&self, reference_date: NaiveDate) -> PatternLearningRequest {
        let mut request = PatternLearningRequest::new(self.business_type, reference_date);
        if let Some(region) = &self.region {
            request = request.with_region(region.clone());
        }
        request.category_slugs = self.category_slugs.clone();
        request
    }
}

/// Config for the relearn runner.
#[derive(Debug, Clone)]
pub struct PatternRelearnRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PatternRelearnRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Counters reported when a runner stops.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RelearnStats {
    pub runs: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub retries: u32,
}

/// Handle of a running relearn task (shutdown + trigger hook).
#[derive(Debug)]
pub struct PatternRelearnRunnerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: mpsc::Sender<()>,
    join: Option<JoinHandle<RelearnStats>>,
}

impl PatternRelearnRunnerHandle {
    /// Request a relearn as soon as the runner is idle.
    ///
    /// Triggers are coalesced: while one is pending, further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the runner and wait for it; an in-flight run completes first.
    pub async fn shutdown(mut self) -> RelearnStats {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.join.take() {
            Some(join) => join.await.unwrap_or_else(|e| {
                error!(error = %e, "relearn runner task panicked");
                RelearnStats::default()
            }),
            None => RelearnStats::default(),
        }
    }
}

impl PatternRelearnRunner {
    /// Spawn a tenant-scoped runner on the current tokio runtime.
    ///
    /// Runs once on startup, then every `interval`, plus whenever
    /// [`PatternRelearnRunnerHandle::trigger`] is called.
    pub fn spawn_for_tenant(
        &self,
        name: &'static str,
        target: RelearnTarget,
        learner: PatternLearner,
    ) -> PatternRelearnRunnerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);

        let cfg = self.clone();
        let join = tokio::spawn(runner_loop(name, cfg, target, learner, shutdown_rx, trigger_rx));

        PatternRelearnRunnerHandle {
            shutdown: Some(shutdown_tx),
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

enum Outcome {
    Succeeded,
    Retryable,
    Fatal,
}

async fn runner_loop(
    name: &'static str,
    cfg: PatternRelearnRunner,
    target: RelearnTarget,
    learner: PatternLearner,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
) -> RelearnStats {
    let tenant_id = target.tenant_id;
    info!(runner = name, tenant = %tenant_id, "pattern relearn runner started");

    let mut stats = RelearnStats::default();
    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true;
    let mut failures: u32 = 0;

    'outer: loop {
        if pending {
            pending = false;
            stats.runs += 1;
            match run_once(name, &target, &learner).await {
                Outcome::Succeeded => {
                    stats.succeeded += 1;
                    failures = 0;
                }
                Outcome::Fatal => {
                    stats.failed += 1;
                    failures = 0;
                }
                Outcome::Retryable => {
                    stats.failed += 1;
                    failures += 1;
                    if failures <= cfg.max_retries {
                        let wait = backoff(cfg.base_backoff, cfg.max_backoff, failures);
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => break 'outer,
                            _ = tokio::time::sleep(wait) => {}
                        }
                        stats.retries += 1;
                        pending = true;
                    } else {
                        warn!(runner = name, tenant = %tenant_id, failures, "giving up until next schedule");
                        failures = 0;
                    }
                }
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            Some(()) = trigger_rx.recv() => pending = true,
            _ = tokio::time::sleep_until(next_tick) => {
                pending = true;
                // Keep a stable cadence even if we were delayed.
                let now = Instant::now();
                while next_tick <= now {
                    next_tick += cfg.interval;
                }
            }
        }
    }

    info!(runner = name, tenant = %tenant_id, runs = stats.runs, failed = stats.failed, "pattern relearn runner stopped");
    stats
}

async fn run_once(name: &'static str, target: &RelearnTarget, learner: &PatternLearner) -> Outcome {
    let request = target.request(Utc::now().date_naive());
    match learner.learn(target.tenant_id, &request).await {
        Ok(result) if result.success => {
            info!(
                runner = name,
                tenant = %target.tenant_id,
                run = %result.run_id,
                effects = result.effects.len(),
                skipped = result.skipped.len(),
                "relearn completed"
            );
            Outcome::Succeeded
        }
        Ok(result) => {
            warn!(
                runner = name,
                tenant = %target.tenant_id,
                run = %result.run_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "relearn failed"
            );
            Outcome::Retryable
        }
        Err(e) => {
            error!(runner = name, tenant = %target.tenant_id, error = %e, "relearn request rejected");
            Outcome::Fatal
        }
    }
}

/// `base * 2^(attempt-1)`, capped at `max`.
fn backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let pow = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(pow).min(max)
}
