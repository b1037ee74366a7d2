use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{
    CarryOverKind, MaxRoomsParams, MinRestPeriodParams, QuotaCarryOverParams, Rule,
    RuleParameters, RuleSeverity, RuleType, RoomContiguityParams, SectorCompatibilityParams,
};

/// Rule set as stored in a YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetFile {
    pub rules: Vec<Rule>,
}

/// Built-in rule set matching the operating-room planning defaults
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "max-rooms-per-supervisor",
            "Maximum rooms per supervisor",
            RuleType::MaxRoomsPerSupervisor,
            RuleSeverity::Error,
            RuleParameters::MaxRoomsPerSupervisor(MaxRoomsParams {
                max_rooms: 2,
                warn_at: Some(3),
            }),
        )
        .with_description("Two rooms per supervisor; a third is possible but not recommended")
        .with_priority(100),
        Rule::new(
            "room-contiguity",
            "Contiguous rooms",
            RuleType::RoomContiguity,
            RuleSeverity::Error,
            RuleParameters::RoomContiguity(RoomContiguityParams::default()),
        )
        .with_description("Rooms supervised in a contiguous-rooms sector must be neighbours")
        .with_priority(90),
        Rule::new(
            "sector-compatibility",
            "Sector compatibility",
            RuleType::SectorCompatibility,
            RuleSeverity::Error,
            RuleParameters::SectorCompatibility(SectorCompatibilityParams {
                incompatible_pairs: vec![("GENERAL".to_string(), "ENDOSCOPY".to_string())],
            }),
        )
        .with_description("A supervisor cannot cover general and endoscopy rooms at once")
        .with_priority(80),
        Rule::new(
            "min-rest-period",
            "Minimum rest period",
            RuleType::MinRestPeriod,
            RuleSeverity::Error,
            RuleParameters::MinRestPeriod(MinRestPeriodParams { min_hours: 11.0 }),
        )
        .with_description("At least 11 hours of rest between two assignments")
        .with_priority(70),
        Rule::new(
            "annual-leave-carry-over",
            "Annual leave carry-over",
            RuleType::QuotaCarryOver,
            RuleSeverity::Error,
            RuleParameters::QuotaCarryOver(QuotaCarryOverParams {
                kind: CarryOverKind::Fixed,
                value: 5.0,
                max_carry_over_days: Some(5.0),
                expiration_days: None,
                leave_type: Some("ANNUAL".to_string()),
            }),
        )
        .with_description("Up to five annual leave days may be carried into the next year")
        .with_priority(10),
    ]
}

/// Load a rule set from a YAML file
pub fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule set {}", path.display()))?;
    let file: RuleSetFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse rule set {}", path.display()))?;
    Ok(file.rules)
}
