use async_trait::async_trait;

use crate::engine::ValidatorError;
use crate::models::{EvaluationContext, Rule, RuleOutcome, RuleParameters, RuleType};

use super::schedule::rooms_held_with;
use super::{RuleValidator, invalid_parameters};

/// Forbids one supervisor from covering two mutually incompatible sectors
/// during the same period. Pair entries match a sector's category or its id.
pub struct SectorCompatibilityValidator;

/// A sector as the rule sees it: id and category, when known
struct SectorRef<'a> {
    id: &'a str,
    category: Option<&'a str>,
}

impl SectorRef<'_> {
    fn matches(&self, key: &str) -> bool {
        self.id == key || self.category == Some(key)
    }

    fn label(&self) -> String {
        match self.category {
            Some(category) => format!("{} ({})", self.id, category),
            None => self.id.to_string(),
        }
    }
}

#[async_trait]
impl RuleValidator for SectorCompatibilityValidator {
    async fn validate(
        &self,
        rule: &Rule,
        ctx: &EvaluationContext,
    ) -> Result<RuleOutcome, ValidatorError> {
        let RuleParameters::SectorCompatibility(params) = &rule.parameters else {
            return Err(invalid_parameters(rule, RuleType::SectorCompatibility));
        };
        let Some(proposed) = &ctx.proposed else {
            return Ok(RuleOutcome::pass(rule, "No room assignment to check"));
        };

        let mut sectors: Vec<SectorRef<'_>> = Vec::new();
        for assignment in rooms_held_with(ctx, proposed) {
            if sectors.iter().any(|s| s.id == assignment.sector_id) {
                continue;
            }
            sectors.push(SectorRef {
                id: &assignment.sector_id,
                category: ctx
                    .sector(&assignment.sector_id)
                    .map(|s| s.category.as_str()),
            });
        }

        let mut conflicts = Vec::new();
        let mut affected = Vec::new();
        for (i, a) in sectors.iter().enumerate() {
            for b in &sectors[i + 1..] {
                let incompatible = params.incompatible_pairs.iter().any(|(x, y)| {
                    (a.matches(x) && b.matches(y)) || (a.matches(y) && b.matches(x))
                });
                if incompatible {
                    conflicts.push(format!("{} and {}", a.label(), b.label()));
                    affected.push(a.id.to_string());
                    affected.push(b.id.to_string());
                }
            }
        }

        if conflicts.is_empty() {
            return Ok(RuleOutcome::pass(rule, "Supervised sectors are compatible"));
        }
        affected.sort();
        affected.dedup();

        Ok(RuleOutcome::fail(
            rule,
            format!(
                "Supervisor {} is assigned to incompatible sectors during {} on {}: {}",
                proposed.supervisor_id,
                proposed.period,
                proposed.date,
                conflicts.join("; ")
            ),
        )
        .with_details(serde_json::json!({
            "supervisor_id": proposed.supervisor_id,
            "sectors": affected,
        }))
        .with_affected(affected)
        .with_suggestion("Keep the supervisor within compatible sectors for this period"))
    }
}
