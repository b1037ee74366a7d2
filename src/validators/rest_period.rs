use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

use crate::engine::ValidatorError;
use crate::models::{
    Assignment, EvaluationContext, Period, Rule, RuleOutcome, RuleParameters, RuleType,
};

use super::{RuleValidator, invalid_parameters};

/// Requires `min_hours` of rest between the proposed assignment and the
/// supervisor's nearest adjacent assignment.
///
/// Daytime assignments sharing the proposed date, and anything concurrent
/// with it, belong to the same duty day and are not subject to the rest
/// requirement. Night shifts and guards always are.
pub struct MinRestPeriodValidator;

fn is_daytime(period: Period) -> bool {
    matches!(period, Period::Morning | Period::Afternoon | Period::FullDay)
}

fn same_duty_day(a: &Assignment, b: &Assignment) -> bool {
    a.date == b.date && (a.concurrent_with(b) || (is_daytime(a.period) && is_daytime(b.period)))
}

/// Time between two windows; zero when they touch or overlap
fn gap_between(a: (NaiveDateTime, NaiveDateTime), b: (NaiveDateTime, NaiveDateTime)) -> Duration {
    if b.1 <= a.0 {
        a.0 - b.1
    } else if b.0 >= a.1 {
        b.0 - a.1
    } else {
        Duration::zero()
    }
}

#[async_trait]
impl RuleValidator for MinRestPeriodValidator {
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        let RuleParameters::MinRestPeriod(params) = &rule.parameters else {
            return Err(invalid_parameters(rule, RuleType::MinRestPeriod));
        };
        if !params.min_hours.is_finite() || params.min_hours < 0.0 {
            return Err(ValidatorError::ParameterOutOfRange {
                rule_id: rule.id.clone(),
                reason: format!("min_hours must be a non-negative number, got {}", params.min_hours),
            });
        }

        let Some(proposed) = &ctx.proposed else {
            return Ok(RuleOutcome::pass(rule, "No assignment to check"));
        };
        let window = proposed.window();

        let nearest: Option<(&Assignment, Duration)> = ctx
            .assignments_of(&proposed.supervisor_id)
            .filter(|a| !same_duty_day(proposed, a))
            .map(|a| (a, gap_between(window, a.window())))
            .min_by_key(|(_, gap)| *gap);

        let Some((neighbour, gap)) = nearest else {
            return Ok(RuleOutcome::pass(rule, "No adjacent assignment"));
        };

        let gap_hours = gap.num_minutes() as f64 / 60.0;
        let details = serde_json::json!({
            "supervisor_id": proposed.supervisor_id,
            "gap_hours": gap_hours,
            "min_hours": params.min_hours,
            "adjacent_date": neighbour.date,
            "adjacent_period": neighbour.period,
        });

        if gap_hours >= params.min_hours {
            return Ok(RuleOutcome::pass(
                rule,
                format!("{gap_hours:.1}h of rest before the nearest assignment"),
            )
            .with_details(details));
        }

        Ok(RuleOutcome::fail(
            rule,
            format!(
                "Only {:.1}h of rest between {} {} and {} {} for {} (minimum: {}h)",
                gap_hours,
                neighbour.date,
                neighbour.period,
                proposed.date,
                proposed.period,
                proposed.supervisor_id,
                params.min_hours
            ),
        )
        .with_details(details)
        .with_affected(vec![neighbour.room_id.clone(), proposed.room_id.clone()])
        .with_suggestion("Schedule the assignment after the required rest period"))
    }
}
