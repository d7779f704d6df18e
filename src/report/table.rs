//! Plain text rendering for the terminal.
//!
//! - tick reports: what was created, tagged, expired and deleted
//! - snapshot and schedule listings as aligned columns
//! - verify findings and repairs

use crate::engine::{TickOutcome, TickReport};
use crate::repair::{Finding, RepairResult};
use crate::report::{ScheduleRow, SnapshotRow};

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn push_errors(output: &mut String, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    output.push_str("\nerrors encountered:\n");
    for error in errors {
        output.push_str(&format!("  {error}\n"));
    }
}

pub fn render_tick(report: &TickReport) -> String {
    let mut output = String::new();
    let name = report.snapshot_name.as_deref().unwrap_or("-");
    let id = report.snapshot_id.unwrap_or_default();

    match report.outcome {
        TickOutcome::Skipped => {
            output.push_str(&format!("nothing due at {}\n", format_timestamp(report.timestamp)));
            return output;
        }
        TickOutcome::Created => output.push_str(&format!("created {name} (#{id})\n")),
        TickOutcome::CreateFailed => output.push_str(&format!("failed to create {name} (#{id})\n")),
    }

    for tier in &report.tiers {
        output.push_str(&format!("  {:<10} {}\n", tier.schedule, tier.period_key));
    }

    if report.expired_relationships > 0 {
        output.push_str(&format!("expired {} relationship(s)\n", report.expired_relationships));
    }

    for deleted in &report.deleted {
        output.push_str(&format!("deleted {deleted}\n"));
    }

    push_errors(&mut output, &report.errors);
    output
}

pub fn render_snapshots(rows: &[SnapshotRow]) -> String {
    if rows.is_empty() {
        return String::from("No snapshots found.\n");
    }

    let mut output = format!("{:<6} {:<20} {:<8} {:<24} {}\n", "ID", "Date", "Status", "Name", "Tiers");
    output.push_str(&"-".repeat(72));
    output.push('\n');

    for row in rows {
        let snapshot = &row.snapshot;
        let tiers = if row.tiers.is_empty() {
            "-".to_string()
        } else {
            row.tiers.join(",")
        };
        output.push_str(&format!(
            "{:<6} {:<20} {:<8} {:<24} {}\n",
            snapshot.id,
            format_timestamp(snapshot.created_at),
            snapshot.status.as_str(),
            truncate(&snapshot.filename, 24),
            tiers
        ));
    }

    output
}

pub fn render_schedules(rows: &[ScheduleRow]) -> String {
    let mut output = format!(
        "{:<10} {:<16} {:>5} {:>7} {:>10}\n",
        "Name", "Format", "Keep", "Active", "Precedence"
    );
    output.push_str(&"-".repeat(52));
    output.push('\n');

    for row in rows {
        let schedule = &row.schedule;
        output.push_str(&format!(
            "{:<10} {:<16} {:>5} {:>7} {:>10}\n",
            schedule.name, schedule.date_format, schedule.keep, row.active, schedule.precedence
        ));
    }

    output
}

pub fn render_repair(result: &RepairResult, dry_run: bool) -> String {
    let mut output = String::new();

    if result.findings.is_empty() && result.errors.is_empty() {
        return String::from("store and snapshot directory agree\n");
    }

    for finding in &result.findings {
        let line = match finding {
            Finding::Missing { filename, .. } => format!("[missing] {filename}"),
            Finding::Stranded { filename, .. } => format!("[stranded] {filename}"),
            Finding::Untracked { path } => format!("[untracked] {}", path.display()),
        };
        output.push_str(&line);
        output.push('\n');
    }

    if !result.repaired.is_empty() {
        output.push('\n');
        for repaired in &result.repaired {
            output.push_str(&format!("{repaired}\n"));
        }
    }

    let fixable = result
        .findings
        .iter()
        .any(|f| !matches!(f, Finding::Untracked { .. }));
    if dry_run && fixable {
        output.push_str("\nrun with --repair to fix missing and stranded snapshots\n");
    }

    push_errors(&mut output, &result.errors);
    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TaggedTier;
    use crate::store::{Snapshot, SnapshotStatus};
    use std::path::PathBuf;

    fn report(outcome: TickOutcome) -> TickReport {
        TickReport {
            timestamp: 1_704_103_200,
            ordinal: 0,
            outcome,
            snapshot_id: Some(4),
            snapshot_name: Some("2024-01-01.000".to_string()),
            tiers: vec![TaggedTier {
                schedule: "daily".to_string(),
                period_key: "20240101".to_string(),
            }],
            expired_relationships: 2,
            deleted: vec!["2023-12-20.000".to_string()],
            errors: Vec::new(),
        }
    }

    #[test]
    fn skipped_tick_mentions_time() {
        let mut skipped = report(TickOutcome::Skipped);
        skipped.snapshot_id = None;
        assert_eq!(render_tick(&skipped), "nothing due at 2024-01-01 10:00:00\n");
    }

    #[test]
    fn created_tick_lists_tiers_and_deletions() {
        let out = render_tick(&report(TickOutcome::Created));
        assert!(out.starts_with("created 2024-01-01.000 (#4)\n"));
        assert!(out.contains("  daily      20240101\n"));
        assert!(out.contains("expired 2 relationship(s)\n"));
        assert!(out.contains("deleted 2023-12-20.000\n"));
        assert!(!out.contains("errors encountered"));
    }

    #[test]
    fn snapshot_listing_shows_tiers() {
        let rows = [SnapshotRow {
            snapshot: Snapshot {
                id: 1,
                filename: "2024-01-01.000".to_string(),
                created_at: 1_704_103_200,
                status: SnapshotStatus::Created,
            },
            tiers: vec!["daily".to_string(), "yearly".to_string()],
        }];
        let out = render_snapshots(&rows);
        assert!(out.contains("2024-01-01 10:00:00"));
        assert!(out.contains("daily,yearly"));
        assert_eq!(render_snapshots(&[]), "No snapshots found.\n");
    }

    #[test]
    fn repair_dry_run_hints_at_repair_flag() {
        let result = RepairResult {
            findings: vec![
                Finding::Stranded { id: 1, filename: "old".to_string() },
                Finding::Untracked { path: PathBuf::from("/snaps/stray") },
            ],
            repaired: Vec::new(),
            errors: Vec::new(),
        };
        let out = render_repair(&result, true);
        assert!(out.contains("[stranded] old\n"));
        assert!(out.contains("[untracked] /snaps/stray\n"));
        assert!(out.contains("--repair"));
        assert!(!render_repair(&result, false).contains("--repair"));
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("short", 24), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }
}
