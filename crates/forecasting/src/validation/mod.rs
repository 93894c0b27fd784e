//! Cross-pattern validation.

pub mod types;
pub mod validator;

pub use types::{
    ObservedOutcome, PatternEvidence, PatternSet, QualityGrade, ScopeValidation, ValidationReport,
    ValidationRequest, ValidationScope, ValidationStatus,
};
pub use validator::{CrossPatternValidator, DEGRADED_SCORE};
