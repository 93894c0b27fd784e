//! Concurrent multi-scope pattern integration.

pub mod integration;
pub mod orchestrator;
pub(crate) mod scopes;
pub mod types;

pub use orchestrator::PatternOrchestrator;
pub use types::{
    CachePolicy, ConflictCandidate, ConflictRecord, ConflictResolution, FailedScope, IntegratedInsight,
    PatternAnalysisRequest, PatternAnalysisResult, PatternScope, PrioritizationStrategy, Recommendation,
    RecommendationPriority, ScopeAnalysis, ScopeContribution,
};
