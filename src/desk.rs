use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::directory::{resolve_name, StudentDirectory};
use crate::ledger::AttendanceLedger;
use crate::models::{
    BulkReport, CheckInEvent, CheckInPatch, ProgressionSnapshot, RosterEntry, RosterMark, Student,
    StudentStatus,
};
use crate::progression::ProgressionCalculator;

pub const MARK_ALL_NOTE: &str = "Present in class";

#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    /// Written; carries the fresh snapshot unless the recompute failed.
    Recorded(Option<ProgressionSnapshot>),
    AlreadyCheckedIn,
    Failed,
}

#[derive(Clone)]
pub struct CheckInDesk {
    ledger: AttendanceLedger,
    progression: ProgressionCalculator,
    directory: Arc<dyn StudentDirectory>,
}

impl CheckInDesk {
    pub fn new(
        ledger: AttendanceLedger,
        progression: ProgressionCalculator,
        directory: Arc<dyn StudentDirectory>,
    ) -> Self {
        Self {
            ledger,
            progression,
            directory,
        }
    }

    pub async fn recompute(&self, student_id: &str) -> Option<ProgressionSnapshot> {
        let name = resolve_name(self.directory.as_ref(), student_id).await;
        self.progression.recompute_and_store(student_id, &name).await
    }

    /// The "already checked in today" test is advisory: two concurrent
    /// callers can both pass it.
    pub async fn check_in(&self, student_id: &str, present: bool, notes: Option<&str>) -> CheckInOutcome {
        if self.ledger.has_checked_in_today(student_id).await {
            info!(student_id, "already checked in today");
            return CheckInOutcome::AlreadyCheckedIn;
        }
        if !self.ledger.record_check_in(student_id, present, notes).await {
            return CheckInOutcome::Failed;
        }
        CheckInOutcome::Recorded(self.recompute(student_id).await)
    }

    pub async fn edit(&self, event_id: &str, patch: &CheckInPatch) -> bool {
        let Some(event) = self.ledger.event_by_id(event_id).await else {
            warn!(event_id, "cannot edit unknown check-in");
            return false;
        };
        if !self.ledger.edit_event(event_id, patch).await {
            return false;
        }
        self.recompute(&event.student_id).await;
        true
    }

    pub async fn delete(&self, event_id: &str) -> bool {
        let Some(event) = self.ledger.event_by_id(event_id).await else {
            warn!(event_id, "cannot delete unknown check-in");
            return false;
        };
        if !self.ledger.delete_event(event_id).await {
            return false;
        }
        self.recompute(&event.student_id).await;
        true
    }

    /// Deletes all of a student's check-ins. The snapshot is recomputed
    /// even after a partial reset so it reflects what is left.
    pub async fn reset_student(&self, student_id: &str) -> bool {
        let reset = self.ledger.reset_all_for_student(student_id).await;
        self.recompute(student_id).await;
        reset
    }

    pub async fn mark_all_present(&self) -> BulkReport {
        let mut report = BulkReport::default();
        let Some((students, today)) = self.students_and_today().await else {
            return report;
        };

        let already: BTreeSet<&str> = today.iter().map(|event| event.student_id.as_str()).collect();
        for student in students.iter().filter(|s| !already.contains(s.id.as_str())) {
            if !self
                .ledger
                .record_check_in(&student.id, true, Some(MARK_ALL_NOTE))
                .await
            {
                report.failure(student.id.as_str(), "check-in write failed");
                continue;
            }
            match self.recompute(&student.id).await {
                Some(_) => report.success(student.id.as_str()),
                None => report.failure(student.id.as_str(), "checked in, progression recompute failed"),
            }
        }

        info!(
            marked = report.succeeded.len(),
            failed = report.failed.len(),
            "mark all present finished"
        );
        report
    }

    pub async fn reset_today(&self) -> BulkReport {
        let today = match self.ledger.try_todays_check_ins().await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "failed to load today's check-ins for reset");
                return BulkReport::default();
            }
        };

        let ids: Vec<String> = today.iter().map(|event| event.id.clone()).collect();
        let report = self.ledger.delete_many(&ids).await;

        let students: BTreeSet<&str> = today.iter().map(|event| event.student_id.as_str()).collect();
        for student_id in students {
            self.recompute(student_id).await;
        }

        info!(
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "today's check-ins reset"
        );
        report
    }

    pub async fn roster(&self) -> Vec<RosterEntry> {
        let Some((students, today)) = self.students_and_today().await else {
            return Vec::new();
        };

        students
            .into_iter()
            .map(|student| {
                let event = today
                    .iter()
                    .find(|event| event.student_id == student.id)
                    .cloned();
                let mark = match &event {
                    Some(event) if event.present => RosterMark::Present,
                    Some(_) => RosterMark::Absent,
                    None => RosterMark::Unmarked,
                };
                RosterEntry { student, mark, event }
            })
            .collect()
    }

    async fn students_and_today(&self) -> Option<(Vec<Student>, Vec<CheckInEvent>)> {
        let students = match self.directory.students().await {
            Ok(students) => students,
            Err(err) => {
                error!(error = %err, "failed to list students");
                return None;
            }
        };
        let today = match self.ledger.try_todays_check_ins().await {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "failed to load today's check-ins");
                return None;
            }
        };
        let active = students
            .into_iter()
            .filter(|student| student.status == StudentStatus::Active)
            .collect();
        Some((active, today))
    }
}
