use async_trait::async_trait;

use crate::engine::ValidatorError;
use crate::models::{EvaluationContext, Rule, RuleOutcome, RuleParameters, RuleSeverity, RuleType};

use super::schedule::{peak_rooms_held_with, room_ids};
use super::{RuleValidator, invalid_parameters};

/// Limits how many rooms one supervisor holds in a period.
///
/// Up to `max_rooms` is clean. Up to `warn_at` is tolerated with a
/// WARNING outcome. Beyond that the hard cap is exceeded and the rule fails
/// with ERROR, whatever severity the rule itself carries.
///
/// Rooms are counted at the busiest instant of the proposed window, so a
/// full-day proposal next to one morning and one afternoon room holds two.
pub struct MaxRoomsPerSupervisorValidator;

#[async_trait]
impl RuleValidator for MaxRoomsPerSupervisorValidator {
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        let RuleParameters::MaxRoomsPerSupervisor(params) = &rule.parameters else {
            return Err(invalid_parameters(rule, RuleType::MaxRoomsPerSupervisor));
        };
        let warn_at = params.warn_at.unwrap_or(params.max_rooms);
        if warn_at < params.max_rooms {
            return Err(ValidatorError::ParameterOutOfRange {
                rule_id: rule.id.clone(),
                reason: format!(
                    "warn_at ({}) is below max_rooms ({})",
                    warn_at, params.max_rooms
                ),
            });
        }

        let Some(proposed) = &ctx.proposed else {
            return Ok(RuleOutcome::pass(rule, "No room assignment to check"));
        };

        let held = peak_rooms_held_with(ctx, proposed);
        let count = held.len();
        let details = serde_json::json!({
            "supervisor_id": proposed.supervisor_id,
            "date": proposed.date,
            "period": proposed.period,
            "room_count": count,
            "max_rooms": params.max_rooms,
            "warn_at": warn_at,
        });

        if count <= params.max_rooms {
            return Ok(RuleOutcome::pass(
                rule,
                format!("Supervisor holds {} of {} rooms", count, params.max_rooms),
            )
            .with_details(details));
        }

        let outcome = if count <= warn_at {
            RuleOutcome::fail(
                rule,
                format!(
                    "Supervisor {} holds {} rooms during {} on {}: possible but not recommended (recommended maximum: {})",
                    proposed.supervisor_id, count, proposed.period, proposed.date, params.max_rooms
                ),
            )
            .with_severity(RuleSeverity::Warning)
        } else {
            RuleOutcome::fail(
                rule,
                format!(
                    "Supervisor {} holds {} rooms during {} on {} (maximum allowed: {})",
                    proposed.supervisor_id, count, proposed.period, proposed.date, warn_at
                ),
            )
            .with_severity(RuleSeverity::Error)
        };

        Ok(outcome
            .with_details(details)
            .with_affected(room_ids(&held))
            .with_suggestion("Assign another supervisor to one of the rooms"))
    }
}
