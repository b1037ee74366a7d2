//! Static checks over a rule set, independent of any evaluation context.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{Rule, RuleType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleIssueKind {
    /// Parameters are shaped for a different rule type
    ParametersMismatch,
    /// Nothing can evaluate this rule; it never fails
    UnregisteredValidator,
    /// Another active rule of the same type and scope carries different parameters
    Conflict { other_rule_id: String },
}

/// A problem found in the rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIssue {
    pub rule_id: String,
    #[serde(flatten)]
    pub kind: RuleIssueKind,
    pub message: String,
}

/// Inspect `rules` against the set of rule types that have a validator
pub fn check_rules(rules: &[Rule], registered: &HashSet<RuleType>) -> Vec<RuleIssue> {
    let mut issues = Vec::new();

    for (i, rule) in rules.iter().enumerate() {
        if !rule.parameters.fits(&rule.rule_type) {
            issues.push(RuleIssue {
                rule_id: rule.id.clone(),
                kind: RuleIssueKind::ParametersMismatch,
                message: format!(
                    "Rule '{}' of type {} carries parameters for another rule type",
                    rule.id, rule.rule_type
                ),
            });
        }

        if !registered.contains(&rule.rule_type) {
            issues.push(RuleIssue {
                rule_id: rule.id.clone(),
                kind: RuleIssueKind::UnregisteredValidator,
                message: format!(
                    "No validator registered for {}; rule '{}' is inert",
                    rule.rule_type, rule.id
                ),
            });
        }

        if !rule.is_active() {
            continue;
        }
        let earlier_conflict = rules[..i].iter().find(|other| {
            other.is_active()
                && other.rule_type == rule.rule_type
                && other.scope == rule.scope
                && other.parameters != rule.parameters
        });
        if let Some(other) = earlier_conflict {
            issues.push(RuleIssue {
                rule_id: rule.id.clone(),
                kind: RuleIssueKind::Conflict {
                    other_rule_id: other.id.clone(),
                },
                message: format!(
                    "Rules '{}' and '{}' constrain the same {} scope with different parameters",
                    other.id, rule.id, rule.rule_type
                ),
            });
        }
    }

    issues
}
