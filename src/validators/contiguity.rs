use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::engine::ValidatorError;
use crate::models::{Assignment, EvaluationContext, Rule, RuleOutcome, RuleParameters, RuleType};

use super::schedule::rooms_held_with;
use super::{RuleValidator, invalid_parameters};

/// In sectors flagged `requires_contiguous_rooms`, the rooms one supervisor
/// holds during a period must be neighbours (room numbers at most `max_gap` apart).
pub struct RoomContiguityValidator;

#[async_trait]
impl RuleValidator for RoomContiguityValidator {
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        let RuleParameters::RoomContiguity(params) = &rule.parameters else {
            return Err(invalid_parameters(rule, RuleType::RoomContiguity));
        };
        let Some(proposed) = &ctx.proposed else {
            return Ok(RuleOutcome::pass(rule, "No room assignment to check"));
        };

        let mut by_sector: BTreeMap<&str, Vec<&Assignment>> = BTreeMap::new();
        for assignment in rooms_held_with(ctx, proposed) {
            by_sector
                .entry(assignment.sector_id.as_str())
                .or_default()
                .push(assignment);
        }

        let mut broken = Vec::new();
        let mut affected = Vec::new();
        for (sector_id, assignments) in &by_sector {
            let requires_contiguity = ctx
                .sector(sector_id)
                .map(|s| s.requires_contiguous_rooms)
                .unwrap_or(false);
            if !requires_contiguity || assignments.len() < 2 {
                continue;
            }

            let mut numbers: Vec<u32> = assignments.iter().map(|a| a.room_number).collect();
            numbers.sort_unstable();
            numbers.dedup();
            let contiguous = numbers.windows(2).all(|w| w[1] - w[0] <= params.max_gap);
            if !contiguous {
                let listed: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
                broken.push(format!("sector {} (rooms {})", sector_id, listed.join(", ")));
                affected.extend(assignments.iter().map(|a| a.room_id.clone()));
            }
        }

        if broken.is_empty() {
            return Ok(RuleOutcome::pass(rule, "Supervised rooms are contiguous"));
        }

        Ok(RuleOutcome::fail(
            rule,
            format!(
                "Supervisor {} holds non-contiguous rooms during {} on {}: {}",
                proposed.supervisor_id,
                proposed.period,
                proposed.date,
                broken.join("; ")
            ),
        )
        .with_details(serde_json::json!({
            "supervisor_id": proposed.supervisor_id,
            "max_gap": params.max_gap,
        }))
        .with_affected(affected)
        .with_suggestion("Choose a room adjacent to the supervisor's other rooms"))
    }
}
