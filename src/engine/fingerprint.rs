use serde::Serialize;

use crate::models::{Assignment, EvaluationContext};

/// Cache key of one evaluation: the canonical serialization of the context
/// together with the rule-set version it was evaluated against.
///
/// The full serialization is kept as the key, so two different contexts can
/// never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: String,
    subjects: Vec<String>,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    rule_set_version: u64,
    context: &'a EvaluationContext,
}

impl CacheKey {
    /// Build the key of `ctx` under `rule_set_version`.
    ///
    /// Order-insensitive collections (existing assignments, sectors,
    /// qualifications) are sorted first so that the same logical context
    /// always produces the same fingerprint.
    pub fn new(ctx: &EvaluationContext, rule_set_version: u64) -> serde_json::Result<Self> {
        let mut canonical = ctx.clone();
        canonical.subject.qualifications.sort();
        canonical.subject.qualifications.dedup();
        canonical.sectors.sort_by(|a, b| a.id.cmp(&b.id));
        canonical.existing_assignments.sort_by(|a, b| {
            let key = |x: &Assignment| {
                (
                    x.date,
                    x.period,
                    x.supervisor_id.clone(),
                    x.room_id.clone(),
                    x.room_number,
                    x.sector_id.clone(),
                    x.starts_at,
                    x.ends_at,
                )
            };
            key(a).cmp(&key(b))
        });

        let fingerprint = serde_json::to_string(&KeyMaterial {
            rule_set_version,
            context: &canonical,
        })?;

        Ok(Self {
            fingerprint,
            subjects: ctx.referenced_subjects(),
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Subject ids the keyed context references, sorted
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn references(&self, subject_id: &str) -> bool {
        self.subjects.binary_search_by(|s| s.as_str().cmp(subject_id)).is_ok()
    }
}
