use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, DayZone};
use crate::directory::{resolve_name, StudentDirectory};
use crate::models::{AttendanceStats, BulkReport, CheckInEvent, CheckInPatch};
use crate::store::{encode, Direction, Document, DocumentStore, Fields, FilterOp, Query, StoreError};

pub const CHECKINS: &str = "checkins";

#[derive(Clone)]
pub struct AttendanceLedger {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn StudentDirectory>,
    clock: Arc<dyn Clock>,
    zone: DayZone,
}

impl AttendanceLedger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn StudentDirectory>,
        clock: Arc<dyn Clock>,
        zone: DayZone,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            zone,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.zone.local_date(self.clock.now())
    }

    pub fn today_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.zone.window(self.clock.now())
    }

    pub async fn record_check_in(&self, student_id: &str, present: bool, notes: Option<&str>) -> bool {
        let timestamp = self.clock.now();
        self.record_check_in_at(student_id, present, notes, timestamp)
            .await
    }

    pub async fn record_check_in_at(
        &self,
        student_id: &str,
        present: bool,
        notes: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> bool {
        match self
            .try_record_check_in(student_id, present, notes, timestamp)
            .await
        {
            Ok(id) => {
                info!(student_id, event_id = %id, present, "check-in recorded");
                true
            }
            Err(err) => {
                error!(student_id, error = %err, "failed to record check-in");
                false
            }
        }
    }

    async fn try_record_check_in(
        &self,
        student_id: &str,
        present: bool,
        notes: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let student_name = resolve_name(self.directory.as_ref(), student_id).await;
        let event = CheckInEvent {
            id: String::new(),
            student_id: student_id.to_string(),
            student_name,
            timestamp,
            present,
            notes: normalize_notes(notes),
            last_edited_at: None,
        };
        self.store.insert(CHECKINS, encode(&event)?).await
    }

    pub async fn has_checked_in_today(&self, student_id: &str) -> bool {
        match self.try_todays_check_ins().await {
            Ok(events) => events.iter().any(|event| event.student_id == student_id),
            Err(err) => {
                error!(student_id, error = %err, "failed to check today's check-in");
                false
            }
        }
    }

    pub async fn todays_check_ins(&self) -> Vec<CheckInEvent> {
        self.try_todays_check_ins().await.unwrap_or_else(|err| {
            error!(error = %err, "failed to load today's check-ins");
            Vec::new()
        })
    }

    pub async fn try_todays_check_ins(&self) -> Result<Vec<CheckInEvent>, StoreError> {
        let (start, end) = self.today_window();
        let query = Query::new()
            .filter("timestamp", FilterOp::Gte, start.timestamp_millis())
            .filter("timestamp", FilterOp::Lt, end.timestamp_millis())
            .order_by("timestamp", Direction::Desc);
        let events = decode_all(self.store.query(CHECKINS, &query).await?)?;
        debug!(count = events.len(), %start, "loaded today's check-ins");
        Ok(events)
    }

    pub async fn todays_event_for(&self, student_id: &str) -> Option<CheckInEvent> {
        self.todays_check_ins()
            .await
            .into_iter()
            .find(|event| event.student_id == student_id)
    }

    pub async fn events_for_student(&self, student_id: &str) -> Vec<CheckInEvent> {
        self.try_events_for_student(student_id)
            .await
            .unwrap_or_else(|err| {
                error!(student_id, error = %err, "failed to load check-ins");
                Vec::new()
            })
    }

    // The store filters by student only; ordering happens here.
    pub async fn try_events_for_student(&self, student_id: &str) -> Result<Vec<CheckInEvent>, StoreError> {
        let query = Query::new().eq("student_id", student_id);
        let mut events = decode_all(self.store.query(CHECKINS, &query).await?)?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(student_id, count = events.len(), "loaded check-ins");
        Ok(events)
    }

    pub async fn recent_history(&self, student_id: &str, limit: usize) -> Vec<CheckInEvent> {
        let mut events = self.events_for_student(student_id).await;
        events.truncate(limit);
        events
    }

    /// Events between `from` and `to`, both inclusive, newest first.
    pub async fn events_in_period(
        &self,
        student_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<CheckInEvent> {
        self.events_for_student(student_id)
            .await
            .into_iter()
            .filter(|event| event.timestamp >= from && event.timestamp <= to)
            .collect()
    }

    pub async fn event_by_id(&self, event_id: &str) -> Option<CheckInEvent> {
        let result = match self.store.get(CHECKINS, event_id).await {
            Ok(Some(doc)) => doc.decode().map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        result.unwrap_or_else(|err| {
            error!(event_id, error = %err, "failed to load check-in");
            None
        })
    }

    pub async fn stats(&self, student_id: &str) -> AttendanceStats {
        self.try_stats(student_id).await.unwrap_or_else(|err| {
            error!(student_id, error = %err, "failed to compute attendance stats");
            AttendanceStats::default()
        })
    }

    pub async fn try_stats(&self, student_id: &str) -> Result<AttendanceStats, StoreError> {
        let events = self.try_events_for_student(student_id).await?;
        Ok(summarize(&events))
    }

    /// Stamps `last_edited_at`; the check-in timestamp is left untouched.
    pub async fn edit_event(&self, event_id: &str, patch: &CheckInPatch) -> bool {
        let mut fields = Fields::new();
        if let Some(present) = patch.present {
            fields.insert("present".to_string(), Value::Bool(present));
        }
        if let Some(notes) = &patch.notes {
            let value = normalize_notes(Some(notes.as_str())).map_or(Value::Null, Value::String);
            fields.insert("notes".to_string(), value);
        }
        fields.insert(
            "last_edited_at".to_string(),
            Value::from(self.clock.now().timestamp_millis()),
        );

        match self.store.update(CHECKINS, event_id, fields).await {
            Ok(()) => {
                info!(event_id, present = ?patch.present, "check-in edited");
                true
            }
            Err(err) => {
                error!(event_id, error = %err, "failed to edit check-in");
                false
            }
        }
    }

    pub async fn delete_event(&self, event_id: &str) -> bool {
        match self.store.delete(CHECKINS, event_id).await {
            Ok(()) => {
                info!(event_id, "check-in deleted");
                true
            }
            Err(err) => {
                error!(event_id, error = %err, "failed to delete check-in");
                false
            }
        }
    }

    /// A failed delete does not stop the loop and nothing is rolled back.
    pub async fn delete_many(&self, event_ids: &[String]) -> BulkReport {
        let mut report = BulkReport::default();
        for event_id in event_ids {
            match self.store.delete(CHECKINS, event_id).await {
                Ok(()) => report.success(event_id.as_str()),
                Err(err) => {
                    warn!(event_id = %event_id, error = %err, "bulk delete skipped a check-in");
                    report.failure(event_id.as_str(), err.to_string());
                }
            }
        }
        report
    }

    /// Removes every check-in for the student. Returns `true` only if all of
    /// them were deleted.
    pub async fn reset_all_for_student(&self, student_id: &str) -> bool {
        let events = match self.try_events_for_student(student_id).await {
            Ok(events) => events,
            Err(err) => {
                error!(student_id, error = %err, "failed to load check-ins for reset");
                return false;
            }
        };
        let ids: Vec<String> = events.into_iter().map(|event| event.id).collect();
        let report = self.delete_many(&ids).await;
        info!(
            student_id,
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "check-ins reset"
        );
        report.is_complete()
    }
}

fn decode_all(docs: Vec<Document>) -> Result<Vec<CheckInEvent>, StoreError> {
    docs.into_iter().map(|doc| doc.decode()).collect()
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|notes| !notes.is_empty())
        .map(str::to_string)
}

/// Half-up integer percentage; 0 when `whole` is 0.
pub fn round_percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part);
    let whole = u64::from(whole);
    ((part * 100 + whole / 2) / whole) as u32
}

pub fn summarize(events: &[CheckInEvent]) -> AttendanceStats {
    let total_classes = events.len() as u32;
    let classes_present = events.iter().filter(|event| event.present).count() as u32;
    let last_present_date = events
        .iter()
        .filter(|event| event.present)
        .map(|event| event.timestamp)
        .max();

    AttendanceStats {
        total_classes,
        classes_present,
        percent_present: round_percent(classes_present, total_classes),
        last_present_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::directory::StoreDirectory;
    use crate::store::MemoryStore;
    use chrono::{Duration, FixedOffset, TimeZone};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        ledger: AttendanceLedger,
        student_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StoreDirectory::new(store.clone()));
        let student_id = directory
            .upsert_by_email("Ana Souza", "ana@academy.test")
            .await
            .unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 17, 18, 30, 0).unwrap(),
        ));
        let ledger = AttendanceLedger::new(
            store.clone(),
            directory,
            clock.clone(),
            DayZone::Fixed(FixedOffset::east_opt(0).unwrap()),
        );
        Fixture {
            store,
            clock,
            ledger,
            student_id,
        }
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_percent(1, 10), 10);
        assert_eq!(round_percent(35, 30), 117);
        assert_eq!(round_percent(1, 8), 13);
        assert_eq!(round_percent(2, 3), 67);
        assert_eq!(round_percent(5, 0), 0);
    }

    #[tokio::test]
    async fn empty_history_gives_zero_stats() {
        let fx = fixture().await;
        let stats = fx.ledger.stats(&fx.student_id).await;
        assert_eq!(stats, AttendanceStats::default());
        assert!(stats.last_present_date.is_none());
    }

    #[tokio::test]
    async fn first_check_in_is_denormalized_and_counted() {
        let fx = fixture().await;
        assert!(!fx.ledger.has_checked_in_today(&fx.student_id).await);
        assert!(fx.ledger.record_check_in(&fx.student_id, true, Some("  ")).await);
        assert!(fx.ledger.has_checked_in_today(&fx.student_id).await);

        let events = fx.ledger.events_for_student(&fx.student_id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].student_name, "Ana Souza");
        assert_eq!(events[0].notes, None);

        let stats = fx.ledger.stats(&fx.student_id).await;
        assert_eq!(stats.total_classes, 1);
        assert_eq!(stats.classes_present, 1);
        assert_eq!(stats.percent_present, 100);
        assert_eq!(stats.last_present_date, Some(fx.clock.now()));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let fx = fixture().await;
        let now = fx.clock.now();
        for days_ago in [3, 1, 5, 2] {
            fx.ledger
                .record_check_in_at(&fx.student_id, true, None, now - Duration::days(days_ago))
                .await;
        }

        let history = fx.ledger.recent_history(&fx.student_id, 2).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, now - Duration::days(1));
        assert_eq!(history[1].timestamp, now - Duration::days(2));

        let period = fx
            .ledger
            .events_in_period(&fx.student_id, now - Duration::days(3), now - Duration::days(2))
            .await;
        assert_eq!(period.len(), 2);
    }

    #[tokio::test]
    async fn stats_count_absences_and_track_last_presence() {
        let fx = fixture().await;
        let now = fx.clock.now();
        fx.ledger
            .record_check_in_at(&fx.student_id, true, None, now - Duration::days(4))
            .await;
        fx.ledger
            .record_check_in_at(&fx.student_id, false, Some("sick"), now - Duration::days(1))
            .await;
        fx.ledger
            .record_check_in_at(&fx.student_id, true, None, now - Duration::days(2))
            .await;

        let stats = fx.ledger.stats(&fx.student_id).await;
        assert_eq!(stats.total_classes, 3);
        assert_eq!(stats.classes_present, 2);
        assert_eq!(stats.percent_present, 67);
        assert_eq!(stats.last_present_date, Some(now - Duration::days(2)));
    }

    #[tokio::test]
    async fn only_events_inside_today_count_as_today() {
        let fx = fixture().await;
        let (start, _) = fx.ledger.today_window();
        fx.ledger
            .record_check_in_at(&fx.student_id, true, None, start - Duration::seconds(1))
            .await;
        assert!(!fx.ledger.has_checked_in_today(&fx.student_id).await);
        assert!(fx.ledger.todays_check_ins().await.is_empty());

        fx.ledger
            .record_check_in_at(&fx.student_id, false, None, start)
            .await;
        assert!(fx.ledger.has_checked_in_today(&fx.student_id).await);
        let today = fx.ledger.todays_event_for(&fx.student_id).await.unwrap();
        assert!(!today.present);
    }

    #[tokio::test]
    async fn same_day_double_check_in_is_double_counted() {
        let fx = fixture().await;
        assert!(fx.ledger.record_check_in(&fx.student_id, true, None).await);
        fx.clock.advance(Duration::minutes(1));
        assert!(fx.ledger.record_check_in(&fx.student_id, true, None).await);

        assert_eq!(fx.ledger.todays_check_ins().await.len(), 2);
        assert_eq!(fx.ledger.stats(&fx.student_id).await.classes_present, 2);
    }

    #[tokio::test]
    async fn edit_keeps_timestamp_and_stamps_edit_time() {
        let fx = fixture().await;
        fx.ledger
            .record_check_in(&fx.student_id, false, Some("late"))
            .await;
        let original = fx.ledger.events_for_student(&fx.student_id).await.remove(0);

        fx.clock.advance(Duration::hours(2));
        let patch = CheckInPatch {
            present: Some(true),
            notes: None,
        };
        assert!(fx.ledger.edit_event(&original.id, &patch).await);

        let edited = fx.ledger.events_for_student(&fx.student_id).await.remove(0);
        assert!(edited.present);
        assert_eq!(edited.timestamp, original.timestamp);
        assert_eq!(edited.notes.as_deref(), Some("late"));
        assert_eq!(edited.last_edited_at, Some(fx.clock.now()));

        let clear_notes = CheckInPatch {
            present: None,
            notes: Some(String::new()),
        };
        assert!(fx.ledger.edit_event(&original.id, &clear_notes).await);
        assert_eq!(fx.ledger.event_by_id(&original.id).await.unwrap().notes, None);
    }

    #[tokio::test]
    async fn editing_or_deleting_missing_events_fails() {
        let fx = fixture().await;
        assert!(!fx.ledger.edit_event("missing", &CheckInPatch::default()).await);
        assert!(!fx.ledger.delete_event("missing").await);
        assert!(fx.ledger.event_by_id("missing").await.is_none());
    }

    #[tokio::test]
    async fn reset_removes_every_event_for_the_student() {
        let fx = fixture().await;
        let now = fx.clock.now();
        for days_ago in 0..12 {
            fx.ledger
                .record_check_in_at(&fx.student_id, days_ago % 3 != 0, None, now - Duration::days(days_ago))
                .await;
        }
        fx.ledger
            .record_check_in("other-student", true, None)
            .await;

        assert!(fx.ledger.reset_all_for_student(&fx.student_id).await);
        assert_eq!(fx.ledger.stats(&fx.student_id).await, AttendanceStats::default());
        assert_eq!(fx.store.count(CHECKINS).await, 1);
    }

    #[tokio::test]
    async fn bulk_delete_reports_each_outcome() {
        let fx = fixture().await;
        fx.ledger.record_check_in(&fx.student_id, true, None).await;
        let id = fx.ledger.events_for_student(&fx.student_id).await.remove(0).id;

        let report = fx
            .ledger
            .delete_many(&[id.clone(), "missing".to_string()])
            .await;
        assert_eq!(report.succeeded, vec![id]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "missing");
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn store_failures_are_absorbed() {
        let fx = fixture().await;
        fx.ledger.record_check_in(&fx.student_id, true, None).await;
        fx.store.set_unavailable(true);

        assert!(!fx.ledger.record_check_in(&fx.student_id, true, None).await);
        assert!(!fx.ledger.has_checked_in_today(&fx.student_id).await);
        assert!(fx.ledger.events_for_student(&fx.student_id).await.is_empty());
        assert_eq!(fx.ledger.stats(&fx.student_id).await, AttendanceStats::default());
        assert!(fx.ledger.try_stats(&fx.student_id).await.is_err());
        assert!(!fx.ledger.reset_all_for_student(&fx.student_id).await);
    }
}
