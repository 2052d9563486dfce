use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::belt::{Belt, LADDER};
use crate::clock::Clock;
use crate::directory::PLACEHOLDER_NAME;
use crate::ledger::{round_percent, AttendanceLedger};
use crate::models::{LadderInfo, ProgressStats, ProgressionSnapshot};
use crate::store::{encode, Direction, DocumentStore, Query, StoreError};

pub const BELT_PROGRESS: &str = "belt_progress";

/// Progress measured against the current belt's own threshold, not the
/// distance to the next one, so it reads above 100 once a student has
/// passed that threshold.
pub fn percent_complete(belt: Belt, classes_present: u32) -> u32 {
    round_percent(classes_present, belt.threshold())
}

/// Present classes still missing for the next belt; 0 at the top of the
/// ladder or once the next threshold is met.
pub fn classes_to_next_belt(belt: Belt, classes_present: u32) -> u32 {
    match belt.next() {
        Some(next) => next.threshold().saturating_sub(classes_present),
        None => 0,
    }
}

pub fn ladder() -> LadderInfo {
    LadderInfo {
        thresholds: LADDER.iter().copied().collect(),
        order: Belt::ORDER.to_vec(),
    }
}

pub fn build_snapshot(
    student_id: &str,
    student_name: &str,
    classes_present: u32,
    now: DateTime<Utc>,
) -> ProgressionSnapshot {
    let current_belt = Belt::for_classes(classes_present);
    ProgressionSnapshot {
        student_id: student_id.to_string(),
        student_name: student_name.to_string(),
        current_belt,
        classes_attended: classes_present,
        classes_required_for_current_belt: current_belt.threshold(),
        percent_complete: percent_complete(current_belt, classes_present),
        next_belt: current_belt.next(),
        last_recomputed_at: now,
    }
}

/// Keeps one snapshot per student in `belt_progress`, rebuilt in full from
/// the ledger on every recompute.
#[derive(Clone)]
pub struct ProgressionCalculator {
    store: Arc<dyn DocumentStore>,
    ledger: AttendanceLedger,
    clock: Arc<dyn Clock>,
}

impl ProgressionCalculator {
    pub fn new(store: Arc<dyn DocumentStore>, ledger: AttendanceLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Recomputes from the present count and overwrites the stored
    /// snapshot. Returns `None` without writing if the count can't be read.
    pub async fn recompute_and_store(&self, student_id: &str, student_name: &str) -> Option<ProgressionSnapshot> {
        match self.try_recompute_and_store(student_id, student_name).await {
            Ok(snapshot) => {
                info!(
                    student_id,
                    belt = %snapshot.current_belt,
                    classes = snapshot.classes_attended,
                    percent = snapshot.percent_complete,
                    "progression recomputed"
                );
                Some(snapshot)
            }
            Err(err) => {
                error!(student_id, error = %err, "failed to recompute progression");
                None
            }
        }
    }

    async fn try_recompute_and_store(
        &self,
        student_id: &str,
        student_name: &str,
    ) -> Result<ProgressionSnapshot, StoreError> {
        let stats = self.ledger.try_stats(student_id).await?;
        let snapshot = build_snapshot(student_id, student_name, stats.classes_present, self.clock.now());
        self.store
            .put(BELT_PROGRESS, student_id, encode(&snapshot)?)
            .await?;
        Ok(snapshot)
    }

    /// Stored snapshot, materialized with the placeholder name on first read.
    pub async fn snapshot(&self, student_id: &str) -> Option<ProgressionSnapshot> {
        match self.store.get(BELT_PROGRESS, student_id).await {
            Ok(Some(doc)) => match doc.decode() {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    error!(student_id, error = %err, "unreadable progression snapshot");
                    None
                }
            },
            Ok(None) => {
                debug!(student_id, "no snapshot yet, materializing");
                self.recompute_and_store(student_id, PLACEHOLDER_NAME).await
            }
            Err(err) => {
                error!(student_id, error = %err, "failed to load progression snapshot");
                None
            }
        }
    }

    pub async fn full_stats(&self, student_id: &str) -> ProgressStats {
        let snapshot = self.snapshot(student_id).await;
        let attendance = self.ledger.stats(student_id).await;

        let Some(snapshot) = snapshot else {
            return ProgressStats {
                last_present_date: attendance.last_present_date,
                ..ProgressStats::default()
            };
        };

        let days_on_current_belt = (self.clock.now() - snapshot.last_recomputed_at)
            .num_days()
            .max(0);

        ProgressStats {
            current_belt: snapshot.current_belt,
            classes_attended: snapshot.classes_attended,
            classes_required_for_current_belt: snapshot.classes_required_for_current_belt,
            percent_complete: snapshot.percent_complete,
            next_belt: snapshot.next_belt,
            days_on_current_belt,
            last_present_date: attendance.last_present_date,
        }
    }

    /// Every stored snapshot, most classes attended first.
    pub async fn all_snapshots(&self) -> Vec<ProgressionSnapshot> {
        let query = Query::new().order_by("classes_attended", Direction::Desc);
        let result: Result<Vec<ProgressionSnapshot>, StoreError> =
            match self.store.query(BELT_PROGRESS, &query).await {
                Ok(docs) => docs.into_iter().map(|doc| doc.decode()).collect(),
                Err(err) => Err(err),
            };
        result.unwrap_or_else(|err| {
            error!(error = %err, "failed to list progression snapshots");
            Vec::new()
        })
    }
}
