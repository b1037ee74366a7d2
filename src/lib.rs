pub mod config;
pub mod engine;
pub mod models;
pub mod telemetry;
pub mod validators;

// Re-export main types
pub use config::{EngineConfig, default_rules, load_rules};
pub use engine::{
    CacheKey, EngineOptions, EvaluationCache, RuleCache, RuleEngine, RuleEngineError, RuleIssue,
    RuleIssueKind, ValidatorError,
};
pub use models::{
    Assignment, EvaluationContext, EvaluationResult, Rule, RuleOutcome, RuleParameters, RuleScope,
    RuleSeverity, RuleStatus, RuleType,
};
pub use validators::{RuleValidator, builtin_validators};

// Re-export logging setup
pub use telemetry::init_tracing;
