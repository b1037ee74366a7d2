mod default_rules;
mod settings;

pub use default_rules::{RuleSetFile, default_rules, load_rules};
pub use settings::{CacheConfig, EngineConfig, EvaluationConfig, LoggingConfig, ScoringConfig};
