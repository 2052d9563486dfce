use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::belt::Belt;
use crate::models::{BeltSummary, CheckInEvent, ProgressionSnapshot, RosterEntry, RosterMark};
use crate::progression::classes_to_next_belt;

pub fn summarize_by_belt(standings: &[ProgressionSnapshot]) -> Vec<BeltSummary> {
    let mut map: BTreeMap<Belt, (usize, u64)> = BTreeMap::new();

    for snapshot in standings {
        let entry = map.entry(snapshot.current_belt).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(snapshot.classes_attended);
    }

    map.into_iter()
        .rev()
        .map(|(belt, (count, total_classes))| BeltSummary {
            belt,
            count,
            avg_classes: if count == 0 {
                0.0
            } else {
                total_classes as f64 / count as f64
            },
        })
        .collect()
}

fn mark_label(mark: RosterMark) -> &'static str {
    match mark {
        RosterMark::Present => "present",
        RosterMark::Absent => "absent",
        RosterMark::Unmarked => "unmarked",
    }
}

pub fn build_report(
    date: NaiveDate,
    roster: &[RosterEntry],
    standings: &[ProgressionSnapshot],
    today: &[CheckInEvent],
) -> String {
    let summaries = summarize_by_belt(standings);
    let mut output = String::new();

    let _ = writeln!(output, "# Academy Attendance Report");
    let _ = writeln!(output, "Generated for {}", date);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Today's Roster");

    if roster.is_empty() {
        let _ = writeln!(output, "No active students.");
    } else {
        let count = |mark: RosterMark| roster.iter().filter(|entry| entry.mark == mark).count();
        let _ = writeln!(
            output,
            "{} present, {} absent, {} unmarked",
            count(RosterMark::Present),
            count(RosterMark::Absent),
            count(RosterMark::Unmarked)
        );
        let _ = writeln!(output);
        for entry in roster {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                entry.student.name,
                entry.student.email,
                mark_label(entry.mark)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Belt Distribution");

    if summaries.is_empty() {
        let _ = writeln!(output, "No progression recorded yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg {:.1} classes)",
                summary.belt, summary.count, summary.avg_classes
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Belt Standings");

    if standings.is_empty() {
        let _ = writeln!(output, "No progression recorded yet.");
    } else {
        for snapshot in standings.iter().take(10) {
            let next = match snapshot.next_belt {
                Some(next) => format!(
                    "{} to {}",
                    classes_to_next_belt(snapshot.current_belt, snapshot.classes_attended),
                    next
                ),
                None => "top of the ladder".to_string(),
            };
            let _ = writeln!(
                output,
                "- {}: {} belt, {} classes ({}%), {}",
                snapshot.student_name,
                snapshot.current_belt,
                snapshot.classes_attended,
                snapshot.percent_complete,
                next
            );
        }
    }

    let mut noted: Vec<&CheckInEvent> = today.iter().filter(|event| event.notes.is_some()).collect();
    noted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Check-in Notes");

    if noted.is_empty() {
        let _ = writeln!(output, "No notes recorded today.");
    } else {
        for event in noted.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} at {}: {}",
                event.student_name,
                event.timestamp.format("%H:%M"),
                event.notes.as_deref().unwrap_or_default()
            );
        }
    }

    output
}
