use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// Scheduling Periods
// ============================================================================

/// Slot of the operating-room day an assignment covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    /// 08:00 - 13:00
    Morning,
    /// 14:00 - 18:30
    Afternoon,
    /// 08:00 - 18:00
    FullDay,
    /// 20:00 - 08:00 next day
    Night,
    /// 08:00 - 08:00 next day
    #[serde(rename = "GUARD_24H")]
    Guard24h,
}

impl Period {
    /// Default start/end offsets from midnight of the assignment date
    fn bounds(self) -> ((u32, u32), (u32, u32), i64) {
        match self {
            Self::Morning => ((8, 0), (13, 0), 0),
            Self::Afternoon => ((14, 0), (18, 30), 0),
            Self::FullDay => ((8, 0), (18, 0), 0),
            Self::Night => ((20, 0), (8, 0), 1),
            Self::Guard24h => ((8, 0), (8, 0), 1),
        }
    }

    /// Concrete time window of this period on `date`
    pub fn window_on(self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let ((sh, sm), (eh, em), end_day_offset) = self.bounds();
        let start = date.and_time(NaiveTime::from_hms_opt(sh, sm, 0).unwrap_or(NaiveTime::MIN));
        let end = (date + Duration::days(end_day_offset))
            .and_time(NaiveTime::from_hms_opt(eh, em, 0).unwrap_or(NaiveTime::MIN));
        (start, end)
    }

    /// Whether two periods of the same day share operating-room time.
    ///
    /// Night shifts only collide with themselves and 24h guards; room
    /// supervision limits are about daytime periods.
    pub fn overlaps(self, other: Period) -> bool {
        use Period::*;
        match (self, other) {
            (a, b) if a == b => true,
            (FullDay | Guard24h, Morning | Afternoon | FullDay | Guard24h) => true,
            (Morning | Afternoon, FullDay | Guard24h) => true,
            (Night, Guard24h) | (Guard24h, Night) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Morning => "MORNING",
            Self::Afternoon => "AFTERNOON",
            Self::FullDay => "FULL_DAY",
            Self::Night => "NIGHT",
            Self::Guard24h => "GUARD_24H",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Context Building Blocks
// ============================================================================

/// The staff member being evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            department: None,
            qualifications: Vec::new(),
        }
    }
}

/// A supervisor placed in an operating room for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub supervisor_id: String,
    pub room_id: String,
    /// Physical room number, used for contiguity
    pub room_number: u32,
    pub sector_id: String,
    pub date: NaiveDate,
    pub period: Period,
    /// Explicit start overriding the period window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<NaiveDateTime>,
    /// Explicit end overriding the period window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<NaiveDateTime>,
}

impl Assignment {
    pub fn new(
        supervisor_id: impl Into<String>,
        room_id: impl Into<String>,
        room_number: u32,
        sector_id: impl Into<String>,
        date: NaiveDate,
        period: Period,
    ) -> Self {
        Self {
            supervisor_id: supervisor_id.into(),
            room_id: room_id.into(),
            room_number,
            sector_id: sector_id.into(),
            date,
            period,
            starts_at: None,
            ends_at: None,
        }
    }

    /// Effective time window, explicit bounds winning over the period defaults
    pub fn window(&self) -> (NaiveDateTime, NaiveDateTime) {
        let (start, end) = self.period.window_on(self.date);
        (self.starts_at.unwrap_or(start), self.ends_at.unwrap_or(end))
    }

    /// Same day and overlapping period
    pub fn concurrent_with(&self, other: &Assignment) -> bool {
        self.date == other.date && self.period.overlaps(other.period)
    }
}

/// Operating-room sector with its planning flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Sector family, e.g. GENERAL, ENDOSCOPY, OPHTALMOLOGY
    pub category: String,
    #[serde(default)]
    pub requires_contiguous_rooms: bool,
}

impl Sector {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: category.into(),
            requires_contiguous_rooms: false,
        }
    }

    pub fn contiguous(mut self) -> Self {
        self.requires_contiguous_rooms = true;
        self
    }
}

/// Inclusive date range the evaluation is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SchedulingWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Request to move unused leave days into the next year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOverRequest {
    pub leave_type: String,
    pub from_year: i32,
    pub to_year: i32,
    /// Days the user wants to carry over
    pub requested_days: f64,
    /// Days still remaining in the source year
    pub source_remaining: f64,
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Everything a validator needs to check one proposed change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed: Option<Assignment>,
    pub current_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<SchedulingWindow>,
    #[serde(default)]
    pub existing_assignments: Vec<Assignment>,
    #[serde(default)]
    pub sectors: Vec<Sector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carry_over: Option<CarryOverRequest>,
}

impl EvaluationContext {
    pub fn new(subject: Subject, current_date: NaiveDate) -> Self {
        Self {
            subject,
            proposed: None,
            current_date,
            window: None,
            existing_assignments: Vec::new(),
            sectors: Vec::new(),
            carry_over: None,
        }
    }

    pub fn with_proposed(mut self, assignment: Assignment) -> Self {
        self.proposed = Some(assignment);
        self
    }

    pub fn with_existing(mut self, assignments: Vec<Assignment>) -> Self {
        self.existing_assignments = assignments;
        self
    }

    pub fn with_sectors(mut self, sectors: Vec<Sector>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn with_window(mut self, window: SchedulingWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_carry_over(mut self, request: CarryOverRequest) -> Self {
        self.carry_over = Some(request);
        self
    }

    pub fn sector(&self, sector_id: &str) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.id == sector_id)
    }

    /// Existing assignments of `supervisor_id`, limited to the scheduling window if one is set
    pub fn assignments_of<'a>(
        &'a self,
        supervisor_id: &'a str,
    ) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.existing_assignments.iter().filter(move |a| {
            a.supervisor_id == supervisor_id
                && self.window.map(|w| w.contains(a.date)).unwrap_or(true)
        })
    }

    /// Every subject id this context references: the subject, the proposed
    /// supervisor and the supervisors of existing assignments
    pub fn referenced_subjects(&self) -> Vec<String> {
        let mut ids: Vec<String> = std::iter::once(self.subject.id.clone())
            .chain(self.proposed.iter().map(|a| a.supervisor_id.clone()))
            .chain(
                self.existing_assignments
                    .iter()
                    .map(|a| a.supervisor_id.clone()),
            )
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
