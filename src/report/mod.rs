pub mod json;
pub mod table;

use serde::Serialize;

use crate::engine::TickReport;
use crate::error::Result;
use crate::repair::RepairResult;
use crate::store::{Schedule, Snapshot};

/// A snapshot with the names of the schedules still holding it.
#[derive(Debug, Serialize)]
pub struct SnapshotRow {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub tiers: Vec<String>,
}

/// A schedule with its number of live relationships.
#[derive(Debug, Serialize)]
pub struct ScheduleRow {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub active: usize,
}

fn emit<T: Serialize + ?Sized>(value: &T, json: bool, table: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", json::render(value)?);
    } else {
        print!("{}", table(value));
    }
    Ok(())
}

pub fn print_tick(report: &TickReport, json: bool) -> Result<()> {
    emit(report, json, table::render_tick)
}

pub fn print_snapshots(rows: &[SnapshotRow], json: bool) -> Result<()> {
    emit(rows, json, table::render_snapshots)
}

pub fn print_schedules(rows: &[ScheduleRow], json: bool) -> Result<()> {
    emit(rows, json, table::render_schedules)
}

pub fn print_repair(result: &RepairResult, dry_run: bool, json: bool) -> Result<()> {
    emit(result, json, |r| table::render_repair(r, dry_run))
}
