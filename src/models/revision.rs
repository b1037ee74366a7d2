//! Rule versioning.
//!
//! Edits to fields that change evaluation bump the rule version and archive
//! an immutable snapshot of the previous row. Cosmetic edits update in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rule::{Rule, RuleParameters, RuleScope, RuleSeverity, RuleStatus, RuleType};

/// Why a revision was archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionReason {
    /// A significant field changed
    Edited,
    /// The rule was soft-deleted
    Deactivated,
}

/// Immutable snapshot of a rule as it was before a versioned change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRevision {
    pub rule_id: String,
    /// Version of the archived snapshot
    pub version: u32,
    pub snapshot: Rule,
    pub reason: RevisionReason,
    pub archived_at: DateTime<Utc>,
}

/// Partial edit of a rule. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rule_type: Option<RuleType>,
    pub severity: Option<RuleSeverity>,
    pub scope: Option<RuleScope>,
    pub enabled: Option<bool>,
    pub status: Option<RuleStatus>,
    pub parameters: Option<RuleParameters>,
    pub priority: Option<i32>,
}

impl RuleUpdate {
    fn apply_to(self, rule: &mut Rule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(description) = self.description {
            rule.description = description;
        }
        if let Some(rule_type) = self.rule_type {
            rule.rule_type = rule_type;
        }
        if let Some(severity) = self.severity {
            rule.severity = severity;
        }
        if let Some(scope) = self.scope {
            rule.scope = scope;
        }
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(status) = self.status {
            rule.status = status;
        }
        if let Some(parameters) = self.parameters {
            rule.parameters = parameters;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
    }
}

/// Archive of superseded rule versions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleHistory {
    revisions: Vec<RuleRevision>,
}

impl RuleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` to `current`, returning the new rule.
    ///
    /// Archives the prior version when a significant field changed.
    pub fn apply_update(&mut self, current: &Rule, update: RuleUpdate, now: DateTime<Utc>) -> Rule {
        let mut next = current.clone();
        update.apply_to(&mut next);
        next.updated_at = now;

        if next.differs_significantly(current) {
            self.archive(current, RevisionReason::Edited, now);
            next.version = current.version + 1;
        }
        next
    }

    /// Soft-delete: mark the rule inactive and archive the prior row
    pub fn deactivate(&mut self, current: &Rule, now: DateTime<Utc>) -> Rule {
        self.archive(current, RevisionReason::Deactivated, now);
        let mut next = current.clone();
        next.status = RuleStatus::Inactive;
        next.version = current.version + 1;
        next.updated_at = now;
        next
    }

    /// Archived revisions of one rule, oldest first
    pub fn revisions_of(&self, rule_id: &str) -> Vec<&RuleRevision> {
        self.revisions.iter().filter(|r| r.rule_id == rule_id).collect()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    fn archive(&mut self, rule: &Rule, reason: RevisionReason, now: DateTime<Utc>) {
        self.revisions.push(RuleRevision {
            rule_id: rule.id.clone(),
            version: rule.version,
            snapshot: rule.clone(),
            reason,
            archived_at: now,
        });
    }
}
