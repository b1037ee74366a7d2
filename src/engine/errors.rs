use thiserror::Error;

use crate::models::RuleType;

/// Structural errors raised by the rule engine's mutating operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleEngineError {
    /// A rule with this id is already in the active set
    #[error("rule '{0}' already exists in the active rule set")]
    DuplicateRule(String),

    /// No rule with this id is in the active set
    #[error("rule '{0}' not found in the active rule set")]
    RuleNotFound(String),

    /// The caller cancelled the request while rules were being evaluated
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Failure of a validator to produce an outcome.
///
/// Never surfaced to engine callers: the engine turns it into a failed
/// ERROR-severity outcome for the offending rule.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidatorError {
    /// The rule carries parameters shaped for another rule type
    #[error("rule '{rule_id}' has parameters that do not fit {expected}")]
    InvalidParameters { rule_id: String, expected: RuleType },

    /// Parameters are well-shaped but out of range
    #[error("rule '{rule_id}': {reason}")]
    ParameterOutOfRange { rule_id: String, reason: String },

    /// Anything else that went wrong while checking the rule
    #[error("{0}")]
    Execution(String),
}
