//! Seasonal/event pattern learning.

pub mod analysis;
pub mod calendar;
pub mod learner;
pub mod ramadan;
pub mod run;
pub mod types;

pub use calendar::{CalendarEvent, DateWindow, EventCatalogue, EventDateRule, EventWindows, LunarAnchor};
pub use learner::{PatternLearner, effect_cache_key};
pub use ramadan::{PhaseEffect, RamadanPattern, RamadanPatternLearner, RamadanPhase, SpecializedLearner};
pub use run::{RunKind, RunRecord, RunState, RunStore, RunTransition};
pub use types::{
    BusinessType, DynamicMultiplier, MultiplierSource, PatternEffect, PatternLearningRequest,
    PatternLearningResult, PatternScopeKey, Provenance, SeasonalBreakdown, SkipReason, SkippedEvent,
};
