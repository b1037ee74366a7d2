use serde::{Deserialize, Serialize};

use super::rule::{Rule, RuleSeverity};

/// Outcome of evaluating one rule against one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub passed: bool,
    pub severity: RuleSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Ids of the assignments, rooms or sectors involved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl RuleOutcome {
    /// Passing outcome carrying the rule's own severity
    pub fn pass(rule: &Rule, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule.id.clone(),
            passed: true,
            severity: rule.severity,
            message: message.into(),
            details: None,
            affected_items: Vec::new(),
            suggestion: None,
        }
    }

    /// Failing outcome carrying the rule's own severity
    pub fn fail(rule: &Rule, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(rule, message)
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_affected(mut self, items: Vec<String>) -> Self {
        self.affected_items = items;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Aggregated verdict of a rule-set evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// True iff no ERROR-severity outcome failed
    pub is_valid: bool,
    /// Failed ERROR outcomes, in evaluation order
    pub violations: Vec<RuleOutcome>,
    /// Failed WARNING outcomes, in evaluation order
    pub warnings: Vec<RuleOutcome>,
    /// Failed INFO outcomes, in evaluation order
    #[serde(default)]
    pub notices: Vec<RuleOutcome>,
    /// Weighted penalty over failed outcomes; lower ranks better
    pub score: f64,
    /// Number of rules dispatched to a validator
    #[serde(default)]
    pub evaluated_rules: usize,
    /// Set only when served from the cache
    #[serde(default)]
    pub from_cache: bool,
}

impl Default for EvaluationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
            warnings: Vec::new(),
            notices: Vec::new(),
            score: 0.0,
            evaluated_rules: 0,
            from_cache: false,
        }
    }
}

impl EvaluationResult {
    /// Messages of every failed outcome, blocking ones first
    pub fn messages(&self) -> Vec<String> {
        self.violations
            .iter()
            .chain(&self.warnings)
            .chain(&self.notices)
            .map(|o| format!("[{}] {}: {}", o.severity, o.rule_id, o.message))
            .collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
