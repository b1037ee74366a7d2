mod cache;
mod consistency;
mod errors;
mod fingerprint;
mod rule_engine;

pub use cache::{EvaluationCache, RuleCache};
pub use consistency::{RuleIssue, RuleIssueKind, check_rules};
pub use errors::{RuleEngineError, ValidatorError};
pub use fingerprint::CacheKey;
pub use rule_engine::{EngineOptions, RuleEngine};
