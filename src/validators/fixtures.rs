//! Shared builders for validator tests.

use chrono::NaiveDate;

use crate::models::{
    Assignment, EvaluationContext, Period, Rule, RuleParameters, RuleSeverity, RuleType, Sector,
    Subject,
};

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

pub fn rule(rule_type: RuleType, parameters: RuleParameters) -> Rule {
    Rule::new("rule-under-test", "Rule under test", rule_type, RuleSeverity::Error, parameters)
}

pub fn morning(supervisor: &str, room: u32, sector: &str) -> Assignment {
    Assignment::new(
        supervisor,
        format!("room-{room}"),
        room,
        sector,
        monday(),
        Period::Morning,
    )
}

/// Context proposing `proposed` for its supervisor on top of `existing`
pub fn context(proposed: Assignment, existing: Vec<Assignment>) -> EvaluationContext {
    EvaluationContext::new(Subject::new(proposed.supervisor_id.clone()), monday())
        .with_proposed(proposed)
        .with_existing(existing)
        .with_sectors(vec![
            Sector::new("general", "GENERAL"),
            Sector::new("endoscopy", "ENDOSCOPY"),
            Sector::new("ophtalmo", "OPHTALMOLOGY").contiguous(),
        ])
}
