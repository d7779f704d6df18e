//! Retention engine.
//!
//! One tick decides whether a snapshot is due, records it and its tier
//! memberships, takes it, and removes snapshots no tier holds any more:
//!
//! 1. evaluate tiers, finest first, stopping at the first tier whose current
//!    period is already tagged
//! 2. record the snapshot row (intent) before touching the filesystem
//! 3. tag it under every applicable tier and collect each tier's overflow
//!    beyond `keep`
//! 4. physically create the snapshot
//! 5. expire the overflow; snapshots left without a live relationship are
//!    due for deletion
//! 6. physically delete those, marking each deleted only after success
//!
//! Store errors abort the tick. Actor errors are recorded in the report:
//! a failed create marks the snapshot `failed` and frees its periods, a
//! failed delete leaves a stranded `created` snapshot for `verify`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::actor::SnapshotActor;
use crate::error::Result;
use crate::format;
use crate::store::{Relationship, Schedule, StatusFilter, Store};

/// A schedule whose current period has no relationship yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicableTier {
    pub schedule: Schedule,
    pub period_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// No tier was due.
    Skipped,
    Created,
    CreateFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedTier {
    pub schedule: String,
    pub period_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub timestamp: i64,
    pub ordinal: u32,
    pub outcome: TickOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    pub tiers: Vec<TaggedTier>,
    pub expired_relationships: usize,
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

impl TickReport {
    fn new(timestamp: i64, ordinal: u32) -> Self {
        TickReport {
            timestamp,
            ordinal,
            outcome: TickOutcome::Skipped,
            snapshot_id: None,
            snapshot_name: None,
            tiers: Vec::new(),
            expired_relationships: 0,
            deleted: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub struct Engine<'a, A: SnapshotActor + ?Sized> {
    store: &'a mut Store,
    actor: &'a A,
    name_format: &'a str,
}

impl<'a, A: SnapshotActor + ?Sized> Engine<'a, A> {
    pub fn new(store: &'a mut Store, actor: &'a A, name_format: &'a str) -> Self {
        Engine {
            store,
            actor,
            name_format,
        }
    }

    /// Tiers due at `now`, finest first. Evaluation stops at the first tier
    /// whose period is already tagged. Periods that do not nest (weeks in
    /// months) can therefore leave a coarser tier waiting until the finer
    /// period rolls over.
    pub fn evaluate_tiers(&self, now: DateTime<Utc>, ordinal: u32) -> Result<Vec<ApplicableTier>> {
        let mut applicable = Vec::new();

        for schedule in self.store.list_schedules()? {
            let period_key = format::render(&schedule.date_format, now, ordinal)?;
            if self.store.relationship_exists(schedule.id, &period_key)? {
                debug!(schedule = %schedule.name, %period_key, "period already tagged, stopping");
                break;
            }
            debug!(schedule = %schedule.name, %period_key, "tier applicable");
            applicable.push(ApplicableTier { schedule, period_key });
        }

        Ok(applicable)
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let ordinal = self.store.count_snapshots_since(format::midnight(now))?;
        let mut report = TickReport::new(now.timestamp(), ordinal);

        let tiers = self.evaluate_tiers(now, ordinal)?;
        if tiers.is_empty() {
            info!("no schedule due");
            return Ok(report);
        }

        let name = format::render(self.name_format, now, ordinal)?;
        let snapshot_id = self.store.create_snapshot(&name, now.timestamp())?;
        report.snapshot_id = Some(snapshot_id);
        report.snapshot_name = Some(name.clone());

        let overflow = self.tag(snapshot_id, &tiers, &mut report)?;

        if let Err(e) = self.actor.create(&name) {
            warn!(snapshot = %name, actor = self.actor.name(), error = %e, "snapshot create failed");
            self.store.fail_snapshot(snapshot_id)?;
            report.tiers.clear();
            report.outcome = TickOutcome::CreateFailed;
            report.errors.push(format!("create {name}: {e}"));
            return Ok(report);
        }

        info!(snapshot = %name, tiers = tiers.len(), "snapshot created");
        report.outcome = TickOutcome::Created;

        let doomed = self.expire(&overflow, &mut report)?;
        self.delete(&doomed, &mut report)?;

        Ok(report)
    }

    /// Relate the snapshot to each tier, returning what falls out of each
    /// tier's keep window as a result.
    fn tag(&mut self, snapshot_id: i64, tiers: &[ApplicableTier], report: &mut TickReport) -> Result<Vec<Relationship>> {
        let live = StatusFilter::live();
        let mut overflow = Vec::new();

        for tier in tiers {
            let schedule = &tier.schedule;
            self.store.create_relationship(snapshot_id, schedule.id, &tier.period_key)?;

            let excess = self.store.find_relationships(schedule.id, &live, schedule.keep)?;
            if !excess.is_empty() {
                debug!(schedule = %schedule.name, keep = schedule.keep, excess = excess.len(), "over keep window");
            }
            overflow.extend(excess);

            report.tiers.push(TaggedTier {
                schedule: schedule.name.clone(),
                period_key: tier.period_key.clone(),
            });
        }

        Ok(overflow)
    }

    /// Expire `overflow`, returning the snapshots no tier holds any more.
    fn expire(&mut self, overflow: &[Relationship], report: &mut TickReport) -> Result<Vec<i64>> {
        if overflow.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = overflow.iter().map(|r| r.id).collect();
        self.store.expire_relationships(&ids)?;
        report.expired_relationships = ids.len();

        let live = StatusFilter::live();
        let mut seen = HashSet::new();
        let mut doomed = Vec::new();

        for relationship in overflow {
            if !seen.insert(relationship.snapshot_id) {
                continue;
            }
            if !self.store.snapshot_has_live_relationship(relationship.snapshot_id, &live)? {
                doomed.push(relationship.snapshot_id);
            }
        }

        Ok(doomed)
    }

    fn delete(&mut self, ids: &[i64], report: &mut TickReport) -> Result<()> {
        for snapshot in self.store.get_snapshots(ids)? {
            match self.actor.delete(&snapshot.filename) {
                Ok(()) => {
                    self.store.mark_snapshots_deleted(&[snapshot.id])?;
                    info!(snapshot = %snapshot.filename, "snapshot deleted");
                    report.deleted.push(snapshot.filename);
                }
                Err(e) => {
                    warn!(snapshot = %snapshot.filename, error = %e, "snapshot delete failed, left stranded");
                    report.errors.push(format!("delete {}: {e}", snapshot.filename));
                }
            }
        }
        Ok(())
    }
}
