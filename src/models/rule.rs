use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Rule Classification
// ============================================================================

/// Constraint family a rule belongs to. Selects the validator that evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    /// Minimum hours of rest between two assignments of the same supervisor
    MinRestPeriod,
    /// Cap on simultaneous rooms held by one supervisor
    MaxRoomsPerSupervisor,
    /// Sectors that one supervisor may not cover during the same period
    SectorCompatibility,
    /// Rooms held in a contiguous-rooms sector must be neighbours
    RoomContiguity,
    /// Leave quota carry-over between years
    QuotaCarryOver,
    /// Rule type this build does not know; inert until a validator is registered
    Custom(String),
}

impl RuleType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MinRestPeriod => "MIN_REST_PERIOD",
            Self::MaxRoomsPerSupervisor => "MAX_ROOMS_PER_SUPERVISOR",
            Self::SectorCompatibility => "SECTOR_COMPATIBILITY",
            Self::RoomContiguity => "ROOM_CONTIGUITY",
            Self::QuotaCarryOver => "QUOTA_CARRY_OVER",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for RuleType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "MIN_REST_PERIOD" => Self::MinRestPeriod,
            "MAX_ROOMS_PER_SUPERVISOR" => Self::MaxRoomsPerSupervisor,
            "SECTOR_COMPATIBILITY" => Self::SectorCompatibility,
            "ROOM_CONTIGUITY" => Self::RoomContiguity,
            "QUOTA_CARRY_OVER" => Self::QuotaCarryOver,
            _ => Self::Custom(value),
        }
    }
}

impl From<RuleType> for String {
    fn from(value: RuleType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failed rule affects the scheduling action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    /// Blocks the action
    #[default]
    Error,
    /// Allowed, but flagged to the user
    Warning,
    /// Informational only
    Info,
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        };
        f.write_str(label)
    }
}

/// Which contexts a rule applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleScope {
    /// Every context
    #[default]
    Global,
    /// Contexts whose proposed assignment is in this sector
    PerSector(String),
    /// Contexts whose subject is this user
    PerUser(String),
}

/// Lifecycle status of a rule row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
    Draft,
}

// ============================================================================
// Rule Parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinRestPeriodParams {
    /// Minimum rest between two assignments, in hours
    pub min_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxRoomsParams {
    /// Rooms a supervisor may hold without any remark
    pub max_rooms: usize,
    /// Highest room count still tolerated with a warning.
    /// Counts above it are errors. `None` makes anything over `max_rooms` an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_at: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomContiguityParams {
    /// Largest allowed difference between consecutive room numbers
    #[serde(default = "default_max_gap")]
    pub max_gap: u32,
}

fn default_max_gap() -> u32 {
    1
}

impl Default for RoomContiguityParams {
    fn default() -> Self {
        Self {
            max_gap: default_max_gap(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorCompatibilityParams {
    /// Pairs of sector categories (or sector ids) that may not be combined
    pub incompatible_pairs: Vec<(String, String)>,
}

/// How the transferable amount of a carry-over is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarryOverKind {
    /// `value` percent of the remaining balance, rounded down
    Percentage,
    /// At most `value` days
    Fixed,
    /// The whole remaining balance
    Unlimited,
    /// The whole remaining balance, expiring `expiration_days` into the target year
    Expirable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaCarryOverParams {
    pub kind: CarryOverKind,
    /// Percentage or day count, depending on `kind`
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_carry_over_days: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_days: Option<u32>,
    /// Leave type this rule governs; `None` applies to all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leave_type: Option<String>,
}

/// Type-specific configuration of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleParameters {
    MinRestPeriod(MinRestPeriodParams),
    MaxRoomsPerSupervisor(MaxRoomsParams),
    RoomContiguity(RoomContiguityParams),
    SectorCompatibility(SectorCompatibilityParams),
    QuotaCarryOver(QuotaCarryOverParams),
    /// Untyped bag for custom rule types
    Raw(serde_json::Value),
}

impl RuleParameters {
    /// Rule type these parameters are shaped for. `None` for raw parameters.
    pub fn rule_type(&self) -> Option<RuleType> {
        match self {
            Self::MinRestPeriod(_) => Some(RuleType::MinRestPeriod),
            Self::MaxRoomsPerSupervisor(_) => Some(RuleType::MaxRoomsPerSupervisor),
            Self::RoomContiguity(_) => Some(RuleType::RoomContiguity),
            Self::SectorCompatibility(_) => Some(RuleType::SectorCompatibility),
            Self::QuotaCarryOver(_) => Some(RuleType::QuotaCarryOver),
            Self::Raw(_) => None,
        }
    }

    /// Whether these parameters fit a rule of the given type
    pub fn fits(&self, rule_type: &RuleType) -> bool {
        match self.rule_type() {
            Some(expected) => &expected == rule_type,
            None => matches!(rule_type, RuleType::Custom(_)),
        }
    }
}

impl Default for RuleParameters {
    fn default() -> Self {
        Self::Raw(serde_json::Value::Null)
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A declarative constraint evaluated by the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier, unique within the active rule set
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub severity: RuleSeverity,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: RuleStatus,
    pub parameters: RuleParameters,
    /// Higher priorities are evaluated and reported first
    #[serde(default)]
    pub priority: i32,
    /// Bumped whenever a significant field changes
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl Rule {
    /// Create an enabled, active, global rule at version 1
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        severity: RuleSeverity,
        parameters: RuleParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            rule_type,
            severity,
            scope: RuleScope::Global,
            enabled: true,
            status: RuleStatus::Active,
            parameters,
            priority: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Enabled and in the Active lifecycle status
    pub fn is_active(&self) -> bool {
        self.enabled && self.status == RuleStatus::Active
    }

    /// Whether any field that changes evaluation differs from `other`
    pub fn differs_significantly(&self, other: &Rule) -> bool {
        self.rule_type != other.rule_type
            || self.severity != other.severity
            || self.scope != other.scope
            || self.parameters != other.parameters
            || self.priority != other.priority
    }
}
