//! Learning-run state tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{ForecastError, ForecastResult, RunId, TenantId};

/// Lifecycle of a learning run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    CollectingData,
    AnalyzingPeriods,
    Aggregating,
    ScoringConfidence,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Forward-only transitions; any non-terminal state may fail.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Pending, CollectingData)
            | (CollectingData, AnalyzingPeriods)
            | (AnalyzingPeriods, Aggregating)
            | (Aggregating, ScoringConfidence)
            | (ScoringConfidence, Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    PatternLearning,
    RamadanLearning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTransition {
    pub state: RunState,
    pub at: DateTime<Utc>,
}

/// Persisted view of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub tenant_id: TenantId,
    pub kind: RunKind,
    pub state: RunState,
    pub history: Vec<RunTransition>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(tenant_id: TenantId, kind: RunKind) -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new(),
            tenant_id,
            kind,
            state: RunState::Pending,
            history: vec![RunTransition {
                state: RunState::Pending,
                at: now,
            }],
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, next: RunState) -> ForecastResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ForecastError::computation(format!(
                "illegal run transition {:?} -> {next:?}",
                self.state
            )));
        }
        let now = Utc::now();
        self.state = next;
        self.updated_at = now;
        self.history.push(RunTransition { state: next, at: now });
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        if !self.state.is_terminal() {
            let now = Utc::now();
            self.state = RunState::Failed;
            self.updated_at = now;
            self.history.push(RunTransition {
                state: RunState::Failed,
                at: now,
            });
        }
    }
}

/// Run state storage keyed by (tenant, run id).
///
/// Implementations must keep tenants isolated: `get` for a run owned by
/// another tenant returns `None`.
pub trait RunStore: Send + Sync {
    /// Insert or replace.
    fn save(&self, record: &RunRecord) -> ForecastResult<()>;

    fn get(&self, tenant_id: TenantId, run_id: RunId) -> ForecastResult<Option<RunRecord>>;

    /// Most recent first.
    fn list(&self, tenant_id: TenantId, limit: usize) -> ForecastResult<Vec<RunRecord>>;
}

impl<S> RunStore for std::sync::Arc<S>
where
    S: RunStore + ?Sized,
{
    fn save(&self, record: &RunRecord) -> ForecastResult<()> {
        (**self).save(record)
    }

    fn get(&self, tenant_id: TenantId, run_id: RunId) -> ForecastResult<Option<RunRecord>> {
        (**self).get(tenant_id, run_id)
    }

    fn list(&self, tenant_id: TenantId, limit: usize) -> ForecastResult<Vec<RunRecord>> {
        (**self).list(tenant_id, limit)
    }
}
