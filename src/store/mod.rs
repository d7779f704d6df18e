//! SQLite retention store.
//!
//! Persists the retention state in five tables:
//! - schedule: the tiers, seeded once and read-only afterwards
//! - snapshot: one row per snapshot attempt, recorded before the attempt
//! - relationship: snapshot x schedule x period key
//! - snapshot_status, relationship_status: status vocabularies
//!
//! Every mutation commits before returning. There is no locking: a store is
//! expected to have a single writer at a time.

mod schema;
mod status;

use std::path::Path;

use rusqlite::{Connection, Row, params, params_from_iter};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::format;

pub use schema::{DEFAULT_SCHEDULES, ScheduleSeed};
pub use status::{RelationshipStatus, SnapshotStatus, StatusFilter};

use status::StatusIds;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    pub date_format: String,
    pub keep: u32,
    pub precedence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub filename: String,
    /// Unix seconds, UTC.
    pub created_at: i64,
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub id: i64,
    pub snapshot_id: i64,
    pub schedule_id: i64,
    pub period_key: String,
    pub status: RelationshipStatus,
}

const SNAPSHOT_COLUMNS: &str = "s.id, s.filename, s.created_at, ss.status
     FROM snapshot s
     JOIN snapshot_status ss ON ss.id = s.status_id";

/// Database handle. Open once per command, reuse across all operations.
pub struct Store {
    conn: Connection,
    statuses: StatusIds,
}

impl Store {
    /// Open (or create and seed with the default schedules) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_seed(path, DEFAULT_SCHEDULES)
    }

    /// Like [`Store::open`], seeding `seed` if the store is created.
    pub fn open_with_seed(path: &Path, seed: &[ScheduleSeed]) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, seed)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_seed(DEFAULT_SCHEDULES)
    }

    pub fn open_in_memory_with_seed(seed: &[ScheduleSeed]) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, seed)
    }

    fn init(mut conn: Connection, seed: &[ScheduleSeed]) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if schema::is_fresh(&conn)? {
            debug!(schedules = seed.len(), "creating retention store");
            schema::setup(&mut conn, seed)?;
        }

        let statuses = StatusIds::load(&conn)?;
        let store = Store { conn, statuses };
        store.check_schedule_order()?;
        Ok(store)
    }

    /// Schedules must not get finer as precedence grows. Only the finest
    /// unit of each format is compared.
    fn check_schedule_order(&self) -> Result<()> {
        let schedules = self.list_schedules()?;
        for pair in schedules.windows(2) {
            let (coarser, finer) = (&pair[0], &pair[1]);
            if format::granularity(&finer.date_format)? < format::granularity(&coarser.date_format)? {
                return Err(Error::ScheduleOrder {
                    finer: finer.name.clone(),
                    coarser: coarser.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// All schedules, finest (lowest precedence) first.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, date_format, keep, precedence
             FROM schedule
             ORDER BY precedence ASC",
        )?;

        let schedules = stmt
            .query_map([], |row| {
                Ok(Schedule {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    date_format: row.get(2)?,
                    keep: row.get(3)?,
                    precedence: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(schedules)
    }

    /// True if `schedule_id` already holds a relationship for `period_key`,
    /// whatever its status.
    pub fn relationship_exists(&self, schedule_id: i64, period_key: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM relationship WHERE schedule_id = ?1 AND period_key = ?2)",
            params![schedule_id, period_key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Record a snapshot with status `created`.
    pub fn create_snapshot(&mut self, filename: &str, created_at: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO snapshot (filename, created_at, status_id) VALUES (?1, ?2, ?3)",
            params![filename, created_at, self.statuses.snapshot(SnapshotStatus::Created)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Tag a snapshot with an active relationship. Fails if the
    /// (schedule, period key) pair is already taken.
    pub fn create_relationship(&mut self, snapshot_id: i64, schedule_id: i64, period_key: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO relationship (snapshot_id, schedule_id, period_key, status_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot_id,
                schedule_id,
                period_key,
                self.statuses.relationship(RelationshipStatus::Active)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// `AND` clauses restricting snapshot `s` and relationship `r` to the
    /// statuses in `filter`, with their parameters.
    fn filter_clause(&self, filter: &StatusFilter) -> (String, Vec<i64>) {
        let mut sql = String::new();
        let mut values = Vec::new();

        if !filter.snapshot.is_empty() {
            sql.push_str(" AND s.status_id IN (");
            sql.push_str(&placeholders(filter.snapshot.len()));
            sql.push(')');
            values.extend(filter.snapshot.iter().map(|s| self.statuses.snapshot(*s)));
        }

        if !filter.relationship.is_empty() {
            sql.push_str(" AND r.status_id IN (");
            sql.push_str(&placeholders(filter.relationship.len()));
            sql.push(')');
            values.extend(filter.relationship.iter().map(|s| self.statuses.relationship(*s)));
        }

        (sql, values)
    }

    /// Relationships of `schedule_id` matching `filter`, newest snapshot
    /// first, without the `skip` most recent ones.
    pub fn find_relationships(&self, schedule_id: i64, filter: &StatusFilter, skip: u32) -> Result<Vec<Relationship>> {
        let (clause, values) = self.filter_clause(filter);
        let sql = format!(
            "SELECT r.id, r.snapshot_id, r.schedule_id, r.period_key, rs.status
             FROM relationship r
             JOIN snapshot s ON s.id = r.snapshot_id
             JOIN relationship_status rs ON rs.id = r.status_id
             WHERE r.schedule_id = ?{clause}
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT -1 OFFSET ?"
        );

        let mut bound = Vec::with_capacity(values.len() + 2);
        bound.push(schedule_id);
        bound.extend(values);
        bound.push(i64::from(skip));

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let relationships = stmt
            .query_map(params_from_iter(bound), relationship_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(relationships)
    }

    /// True if any relationship matching `filter` still references the snapshot.
    pub fn snapshot_has_live_relationship(&self, snapshot_id: i64, filter: &StatusFilter) -> Result<bool> {
        let (clause, values) = self.filter_clause(filter);
        let sql = format!(
            "SELECT EXISTS(
                SELECT 1 FROM relationship r
                JOIN snapshot s ON s.id = r.snapshot_id
                WHERE r.snapshot_id = ?{clause}
             )"
        );

        let mut bound = Vec::with_capacity(values.len() + 1);
        bound.push(snapshot_id);
        bound.extend(values);

        let live = self.conn.query_row(&sql, params_from_iter(bound), |row| row.get(0))?;
        Ok(live)
    }

    pub fn expire_relationships(&mut self, ids: &[i64]) -> Result<()> {
        let expired = self.statuses.relationship(RelationshipStatus::Expired);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("UPDATE relationship SET status_id = ?1 WHERE id = ?2")?;
            for id in ids {
                stmt.execute(params![expired, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn mark_snapshots_deleted(&mut self, ids: &[i64]) -> Result<usize> {
        self.set_snapshot_status(ids, SnapshotStatus::Deleted)
    }

    /// Move `created` snapshots to `status`. Snapshots already in a terminal
    /// status are left alone; returns how many rows changed.
    pub fn set_snapshot_status(&mut self, ids: &[i64], status: SnapshotStatus) -> Result<usize> {
        let target = self.statuses.snapshot(status);
        let created = self.statuses.snapshot(SnapshotStatus::Created);
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare_cached("UPDATE snapshot SET status_id = ?1 WHERE id = ?2 AND status_id = ?3")?;
            for id in ids {
                changed += stmt.execute(params![target, id, created])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Number of snapshots recorded at or after `timestamp`, any status.
    pub fn count_snapshots_since(&self, timestamp: i64) -> Result<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshot WHERE created_at >= ?1",
            params![timestamp],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Snapshots for `ids`, in the order given. Unknown ids are skipped.
    pub fn get_snapshots(&self, ids: &[i64]) -> Result<Vec<Snapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} WHERE s.id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            let mut rows = stmt.query(params![id])?;
            if let Some(row) = rows.next()? {
                snapshots.push(snapshot_from_row(row)?);
            }
        }
        Ok(snapshots)
    }

    /// Snapshots newest first. Without `include_gone` only `created` ones.
    pub fn list_snapshots(&self, since: Option<i64>, include_gone: bool) -> Result<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS}
             WHERE s.created_at >= ?1 AND (?2 OR s.status_id = ?3)
             ORDER BY s.created_at DESC, s.id DESC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let snapshots = stmt
            .query_map(
                params![
                    since.unwrap_or(i64::MIN),
                    include_gone,
                    self.statuses.snapshot(SnapshotStatus::Created)
                ],
                snapshot_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// `created` snapshots that no active relationship references.
    pub fn stranded_snapshots(&self) -> Result<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS}
             WHERE s.status_id = ?1
               AND NOT EXISTS (
                 SELECT 1 FROM relationship r
                 WHERE r.snapshot_id = s.id AND r.status_id = ?2
               )
             ORDER BY s.created_at ASC, s.id ASC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let snapshots = stmt
            .query_map(
                params![
                    self.statuses.snapshot(SnapshotStatus::Created),
                    self.statuses.relationship(RelationshipStatus::Active)
                ],
                snapshot_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// Names of the schedules still actively holding the snapshot, finest first.
    pub fn active_tiers(&self, snapshot_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT sc.name
             FROM relationship r
             JOIN schedule sc ON sc.id = r.schedule_id
             WHERE r.snapshot_id = ?1 AND r.status_id = ?2
             ORDER BY sc.precedence ASC",
        )?;

        let names = stmt
            .query_map(
                params![snapshot_id, self.statuses.relationship(RelationshipStatus::Active)],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(names)
    }

    /// Remove every relationship of a snapshot whose physical create failed,
    /// freeing its periods for a later tick.
    pub fn retract_relationships(&mut self, snapshot_id: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM relationship WHERE snapshot_id = ?1", params![snapshot_id])?;
        Ok(removed)
    }

    /// Mark a `created` snapshot `failed` and retract its relationships in
    /// one transaction. Returns the number of relationships removed.
    pub fn fail_snapshot(&mut self, snapshot_id: i64) -> Result<usize> {
        let failed = self.statuses.snapshot(SnapshotStatus::Failed);
        let created = self.statuses.snapshot(SnapshotStatus::Created);

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE snapshot SET status_id = ?1 WHERE id = ?2 AND status_id = ?3",
            params![failed, snapshot_id, created],
        )?;
        let removed = tx.execute("DELETE FROM relationship WHERE snapshot_id = ?1", params![snapshot_id])?;
        tx.commit()?;

        Ok(removed)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        filename: row.get(1)?,
        created_at: row.get(2)?,
        status: row.get(3)?,
    })
}

fn relationship_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        snapshot_id: row.get(1)?,
        schedule_id: row.get(2)?,
        period_key: row.get(3)?,
        status: row.get(4)?,
    })
}
