use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::engine::ValidatorError;
use crate::models::{
    CarryOverKind, CarryOverRequest, EvaluationContext, QuotaCarryOverParams, Rule, RuleOutcome,
    RuleParameters, RuleType,
};

use super::{RuleValidator, invalid_parameters};

/// Amounts derived from a carry-over rule and a leave balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOverComputation {
    /// Days left in the source year
    pub original_remaining: f64,
    /// Days the rule lets the user transfer
    pub transferable: f64,
    /// Date the carried days expire, if they do
    pub expiry_date: Option<NaiveDate>,
}

/// Compute how many days `request` may carry over under `params`.
pub fn compute_carry_over(
    params: &QuotaCarryOverParams,
    request: &CarryOverRequest,
) -> Result<CarryOverComputation, String> {
    if !params.value.is_finite() || params.value < 0.0 {
        return Err(format!("value must be a non-negative number, got {}", params.value));
    }

    let remaining = request.source_remaining.max(0.0);
    let transferable = match params.kind {
        CarryOverKind::Percentage => {
            if params.value > 100.0 {
                return Err(format!("percentage must not exceed 100, got {}", params.value));
            }
            (remaining * params.value / 100.0).floor()
        }
        CarryOverKind::Fixed => remaining.min(params.value),
        CarryOverKind::Unlimited | CarryOverKind::Expirable => remaining,
    };
    let transferable = match params.max_carry_over_days {
        Some(cap) => transferable.min(cap.max(0.0)),
        None => transferable,
    };

    if params.kind == CarryOverKind::Expirable && params.expiration_days.is_none() {
        return Err("expirable carry-over requires expiration_days".to_string());
    }
    let expiry_date = match params.expiration_days {
        Some(days) => {
            let year_start = NaiveDate::from_ymd_opt(request.to_year, 1, 1)
                .ok_or_else(|| format!("invalid target year {}", request.to_year))?;
            let expiry = year_start
                .checked_add_signed(Duration::days(i64::from(days)))
                .ok_or_else(|| format!("expiration_days {days} overflows the calendar"))?;
            Some(expiry)
        }
        None => None,
    };

    Ok(CarryOverComputation {
        original_remaining: remaining,
        transferable,
        expiry_date,
    })
}

/// Checks a leave carry-over request against the balance and the rule's
/// carry-over policy.
pub struct QuotaCarryOverValidator;

#[async_trait]
impl RuleValidator for QuotaCarryOverValidator {
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        let RuleParameters::QuotaCarryOver(params) = &rule.parameters else {
            return Err(invalid_parameters(rule, RuleType::QuotaCarryOver));
        };
        let Some(request) = &ctx.carry_over else {
            return Ok(RuleOutcome::pass(rule, "No carry-over request"));
        };
        if let Some(leave_type) = &params.leave_type {
            if leave_type != &request.leave_type {
                return Ok(RuleOutcome::pass(
                    rule,
                    format!("Rule does not govern {} leave", request.leave_type),
                ));
            }
        }

        let computation = compute_carry_over(params, request).map_err(|reason| {
            ValidatorError::ParameterOutOfRange {
                rule_id: rule.id.clone(),
                reason,
            }
        })?;
        let details = serde_json::to_value(&computation)
            .map_err(|e| ValidatorError::Execution(e.to_string()))?;
        let affected = vec![format!("{}:{}", ctx.subject.id, request.leave_type)];

        if request.requested_days < 0.0 {
            return Ok(RuleOutcome::fail(rule, "Requested carry-over cannot be negative")
                .with_details(details)
                .with_affected(affected));
        }

        if request.requested_days > computation.original_remaining {
            return Ok(RuleOutcome::fail(
                rule,
                format!(
                    "Requested {} day(s) of {} leave but only {} remain in {}",
                    request.requested_days,
                    request.leave_type,
                    computation.original_remaining,
                    request.from_year
                ),
            )
            .with_details(details)
            .with_affected(affected)
            .with_suggestion(format!(
                "Request at most {} day(s)",
                computation.transferable
            )));
        }

        if request.requested_days > computation.transferable {
            return Ok(RuleOutcome::fail(
                rule,
                format!(
                    "At most {} day(s) of {} leave can be carried over to {} (requested {})",
                    computation.transferable,
                    request.leave_type,
                    request.to_year,
                    request.requested_days
                ),
            )
            .with_details(details)
            .with_affected(affected)
            .with_suggestion(format!(
                "Request at most {} day(s)",
                computation.transferable
            )));
        }

        let message = match computation.expiry_date {
            Some(expiry) => format!(
                "{} day(s) can be carried over to {}; they expire on {}",
                request.requested_days, request.to_year, expiry
            ),
            None => format!(
                "{} day(s) can be carried over to {}",
                request.requested_days, request.to_year
            ),
        };
        Ok(RuleOutcome::pass(rule, message).with_details(details))
    }
}
