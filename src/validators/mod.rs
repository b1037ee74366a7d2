//! Rule validators, one per constraint type.
//!
//! A validator maps `(rule, context)` to a [`RuleOutcome`]. It may read
//! anything reachable from the context but never touches the rule set or
//! the cache. Returning `Err` marks a fault in the validator itself, not a
//! constraint failure; the engine reports it as a failed ERROR outcome.

mod carry_over;
mod contiguity;
#[cfg(test)]
mod fixtures;
mod max_rooms;
mod rest_period;
mod schedule;
mod sector_compatibility;

pub use carry_over::{CarryOverComputation, QuotaCarryOverValidator, compute_carry_over};
pub use contiguity::RoomContiguityValidator;
pub use max_rooms::MaxRoomsPerSupervisorValidator;
pub use rest_period::MinRestPeriodValidator;
pub use schedule::{peak_rooms_held_with, rooms_held_with};
pub use sector_compatibility::SectorCompatibilityValidator;

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::ValidatorError;
use crate::models::{EvaluationContext, Rule, RuleOutcome, RuleType};

/// Strategy checking one rule type against an evaluation context
#[async_trait]
pub trait RuleValidator: Send + Sync {
    /// Evaluate `rule` against `ctx`
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError>;
}

/// Validators for every built-in rule type
pub fn builtin_validators() -> Vec<(RuleType, Arc<dyn RuleValidator>)> {
    let rest_period: Arc<dyn RuleValidator> = Arc::new(MinRestPeriodValidator);
    let max_rooms: Arc<dyn RuleValidator> = Arc::new(MaxRoomsPerSupervisorValidator);
    let contiguity: Arc<dyn RuleValidator> = Arc::new(RoomContiguityValidator);
    let sectors: Arc<dyn RuleValidator> = Arc::new(SectorCompatibilityValidator);
    let carry_over: Arc<dyn RuleValidator> = Arc::new(QuotaCarryOverValidator);

    vec![
        (RuleType::MinRestPeriod, rest_period),
        (RuleType::MaxRoomsPerSupervisor, max_rooms),
        (RuleType::RoomContiguity, contiguity),
        (RuleType::SectorCompatibility, sectors),
        (RuleType::QuotaCarryOver, carry_over),
    ]
}

fn invalid_parameters(rule: &Rule, expected: RuleType) -> ValidatorError {
    ValidatorError::InvalidParameters {
        rule_id: rule.id.clone(),
        expected,
    }
}
