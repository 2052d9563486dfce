use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use belt_progress::belt::Belt;
use belt_progress::clock::SystemClock;
use belt_progress::config::Config;
use belt_progress::db::{self, PgStore};
use belt_progress::desk::CheckInOutcome;
use belt_progress::models::{CheckInEvent, CheckInPatch, RosterMark};
use belt_progress::progression::{classes_to_next_belt, ladder};
use belt_progress::{report, telemetry, Academy};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "belt-progress")]
#[command(about = "Attendance check-in and belt progression for a jiu-jitsu academy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students and check-ins
    Seed,
    /// Import check-ins from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Check a student in for today
    CheckIn {
        student: String,
        /// Record the student as absent instead of present
        #[arg(long)]
        absent: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show a student's most recent check-ins
    History {
        student: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show attendance stats for a student
    Stats { student: String },
    /// Show belt progress for a student
    Progress { student: String },
    /// Rebuild a student's progression snapshot from their check-ins
    Recompute { student: String },
    /// List the belt ladder
    Ladder,
    /// Edit an existing check-in
    #[command(group(
        ArgGroup::new("mark")
            .args(["present", "absent"])
            .multiple(false)
    ))]
    Edit {
        event: String,
        #[arg(long)]
        present: bool,
        #[arg(long)]
        absent: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a check-in
    Delete { event: String },
    /// Delete every check-in for a student
    Reset {
        student: String,
        /// Required; this cannot be undone
        #[arg(long)]
        confirm: bool,
    },
    /// Check in every active student who has not checked in today
    MarkAllPresent,
    /// Delete all of today's check-ins
    ResetToday {
        #[arg(long)]
        confirm: bool,
    },
    /// Show today's roster
    Roster,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "academy-report.md")]
        out: PathBuf,
    },
}

fn print_event(event: &CheckInEvent) {
    let mark = if event.present { "present" } else { "absent" };
    let edited = if event.last_edited_at.is_some() { " (edited)" } else { "" };
    println!(
        "- {} {} {}{} {}",
        event.id,
        event.timestamp.format("%Y-%m-%d %H:%M"),
        mark,
        edited,
        event.notes.as_deref().unwrap_or_default()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let academy = Academy::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(SystemClock),
        config.day_zone,
    );

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&academy).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&academy, &csv).await?;
            println!("Inserted {inserted} check-ins from {}.", csv.display());
        }
        Commands::CheckIn {
            student,
            absent,
            notes,
        } => match academy
            .desk
            .check_in(&student, !absent, notes.as_deref())
            .await
        {
            CheckInOutcome::Recorded(Some(snapshot)) => {
                println!(
                    "Checked in. {} belt, {} classes ({}%).",
                    snapshot.current_belt, snapshot.classes_attended, snapshot.percent_complete
                );
            }
            CheckInOutcome::Recorded(None) => {
                println!("Checked in. Progress could not be updated; run `recompute` later.");
            }
            CheckInOutcome::AlreadyCheckedIn => {
                println!("Already checked in today.");
            }
            CheckInOutcome::Failed => anyhow::bail!("Check-in failed, try again."),
        },
        Commands::History { student, limit } => {
            let limit = limit.unwrap_or(config.history_limit);
            let events = academy.ledger.recent_history(&student, limit).await;
            if events.is_empty() {
                println!("No check-ins found.");
                return Ok(());
            }
            for event in events.iter() {
                print_event(event);
            }
        }
        Commands::Stats { student } => {
            let stats = academy.ledger.stats(&student).await;
            println!(
                "{} classes, {} present ({}%)",
                stats.total_classes, stats.classes_present, stats.percent_present
            );
            match stats.last_present_date {
                Some(date) => println!("Last present {}", date.format("%Y-%m-%d")),
                None => println!("Never present"),
            }
        }
        Commands::Progress { student } => {
            let stats = academy.progression.full_stats(&student).await;
            println!(
                "{} belt: {} of {} classes ({}%)",
                stats.current_belt,
                stats.classes_attended,
                stats.classes_required_for_current_belt,
                stats.percent_complete
            );
            match stats.next_belt {
                Some(next) => println!(
                    "{} classes to {}",
                    classes_to_next_belt(stats.current_belt, stats.classes_attended),
                    next
                ),
                None => println!("Top of the ladder"),
            }
            println!("{} days since last update", stats.days_on_current_belt);
        }
        Commands::Recompute { student } => match academy.desk.recompute(&student).await {
            Some(snapshot) => println!(
                "{}: {} belt, {} classes ({}%).",
                snapshot.student_name,
                snapshot.current_belt,
                snapshot.classes_attended,
                snapshot.percent_complete
            ),
            None => anyhow::bail!("Recompute failed, try again."),
        },
        Commands::Ladder => {
            let info = ladder();
            for belt in info.order.iter() {
                let threshold = info.thresholds.get(belt).copied().unwrap_or_default();
                println!("- {:<7} {:>4} classes", belt, threshold);
            }
        }
        Commands::Edit {
            event,
            present,
            absent,
            notes,
        } => {
            let patch = CheckInPatch {
                present: match (present, absent) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                notes,
            };
            if !academy.desk.edit(&event, &patch).await {
                anyhow::bail!("Edit failed, try again.");
            }
            println!("Check-in updated.");
        }
        Commands::Delete { event } => {
            if !academy.desk.delete(&event).await {
                anyhow::bail!("Delete failed, try again.");
            }
            println!("Check-in deleted.");
        }
        Commands::Reset { student, confirm } => {
            if !confirm {
                anyhow::bail!("Refusing to delete every check-in without --confirm.");
            }
            if !academy.desk.reset_student(&student).await {
                anyhow::bail!("Reset did not complete, try again.");
            }
            println!("All check-ins deleted; progress reset to {}.", Belt::White);
        }
        Commands::MarkAllPresent => {
            let outcome = academy.desk.mark_all_present().await;
            println!("Marked {} students present.", outcome.succeeded.len());
            for failure in outcome.failed.iter() {
                println!("- {}: {}", failure.id, failure.reason);
            }
            if !outcome.is_complete() {
                anyhow::bail!("{} students could not be marked.", outcome.failed.len());
            }
        }
        Commands::ResetToday { confirm } => {
            if !confirm {
                anyhow::bail!("Refusing to delete today's check-ins without --confirm.");
            }
            let outcome = academy.desk.reset_today().await;
            println!("Deleted {} check-ins.", outcome.succeeded.len());
            if !outcome.is_complete() {
                anyhow::bail!("{} check-ins could not be deleted.", outcome.failed.len());
            }
        }
        Commands::Roster => {
            let roster = academy.desk.roster().await;
            if roster.is_empty() {
                println!("No active students.");
                return Ok(());
            }
            for entry in roster.iter() {
                let mark = match entry.mark {
                    RosterMark::Present => "present",
                    RosterMark::Absent => "absent",
                    RosterMark::Unmarked => "-",
                };
                println!("- {:<8} {} ({})", mark, entry.student.name, entry.student.id);
            }
        }
        Commands::Report { out } => {
            let roster = academy.desk.roster().await;
            let standings = academy.progression.all_snapshots().await;
            let today = academy.ledger.todays_check_ins().await;
            let date = academy.ledger.today();
            let report = report::build_report(date, &roster, &standings, &today);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
