use std::collections::BTreeMap;

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::belt::Belt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInEvent {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_edited_at: Option<DateTime<Utc>>,
}

/// Fields an admin may change on an existing check-in. The timestamp is
/// never editable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckInPatch {
    pub present: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub total_classes: u32,
    pub classes_present: u32,
    pub percent_present: u32,
    pub last_present_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSnapshot {
    pub student_id: String,
    pub student_name: String,
    pub current_belt: Belt,
    pub classes_attended: u32,
    pub classes_required_for_current_belt: u32,
    pub percent_complete: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_belt: Option<Belt>,
    #[serde(with = "ts_milliseconds")]
    pub last_recomputed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    pub current_belt: Belt,
    pub classes_attended: u32,
    pub classes_required_for_current_belt: u32,
    pub percent_complete: u32,
    pub next_belt: Option<Belt>,
    /// Days since the snapshot was last recomputed, not since the belt was
    /// earned.
    pub days_on_current_belt: i64,
    pub last_present_date: Option<DateTime<Utc>>,
}

impl Default for ProgressStats {
    fn default() -> Self {
        Self {
            current_belt: Belt::White,
            classes_attended: 0,
            classes_required_for_current_belt: Belt::White.threshold(),
            percent_complete: 0,
            next_belt: Belt::White.next(),
            days_on_current_belt: 0,
            last_present_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderInfo {
    pub thresholds: BTreeMap<Belt, u32>,
    pub order: Vec<Belt>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub status: StudentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn success(&mut self, id: impl Into<String>) {
        self.succeeded.push(id.into());
    }

    pub fn failure(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(BulkFailure {
            id: id.into(),
            reason: reason.into(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RosterMark {
    Present,
    Absent,
    Unmarked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub student: Student,
    pub mark: RosterMark,
    pub event: Option<CheckInEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeltSummary {
    pub belt: Belt,
    pub count: usize,
    pub avg_classes: f64,
}
