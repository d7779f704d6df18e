//! SQL schema and seed data for the retention store.

use rusqlite::{Connection, params};

use super::status::{RelationshipStatus, SnapshotStatus};

/// A schedule row to insert when a store is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSeed {
    pub name: &'static str,
    pub date_format: &'static str,
    pub keep: u32,
    pub precedence: i64,
}

/// Seven tiers, finest first.
pub const DEFAULT_SCHEDULES: &[ScheduleSeed] = &[
    ScheduleSeed { name: "regular", date_format: "%Y%m%d%H%M%S", keep: 10, precedence: 100 },
    ScheduleSeed { name: "hourly", date_format: "%Y%m%d%H", keep: 36, precedence: 200 },
    ScheduleSeed { name: "daily", date_format: "%Y%m%d", keep: 11, precedence: 300 },
    ScheduleSeed { name: "weekly", date_format: "%Yw%W", keep: 6, precedence: 400 },
    ScheduleSeed { name: "monthly", date_format: "%Y%m", keep: 6, precedence: 500 },
    ScheduleSeed { name: "quarterly", date_format: "%Yq%q", keep: 6, precedence: 600 },
    ScheduleSeed { name: "yearly", date_format: "%Y", keep: 4, precedence: 700 },
];

const SCHEMA: &str = "
CREATE TABLE snapshot_status (
    id      INTEGER PRIMARY KEY,
    status  TEXT NOT NULL UNIQUE
);

CREATE TABLE relationship_status (
    id      INTEGER PRIMARY KEY,
    status  TEXT NOT NULL UNIQUE
);

CREATE TABLE schedule (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    date_format  TEXT NOT NULL,
    keep         INTEGER NOT NULL CHECK (keep >= 0),
    precedence   INTEGER NOT NULL UNIQUE
);

CREATE TABLE snapshot (
    id          INTEGER PRIMARY KEY,
    filename    TEXT NOT NULL,
    created_at  INTEGER NOT NULL,   -- unix seconds, UTC
    status_id   INTEGER NOT NULL REFERENCES snapshot_status(id)
);

-- One row per (schedule, period). The engine checks before inserting;
-- the constraint turns a missed check into an error instead of a duplicate.
CREATE TABLE relationship (
    id           INTEGER PRIMARY KEY,
    snapshot_id  INTEGER NOT NULL REFERENCES snapshot(id),
    schedule_id  INTEGER NOT NULL REFERENCES schedule(id),
    period_key   TEXT NOT NULL,
    status_id    INTEGER NOT NULL REFERENCES relationship_status(id),
    UNIQUE (schedule_id, period_key)
);

CREATE INDEX relationship_snapshot_idx ON relationship(snapshot_id);
CREATE INDEX snapshot_created_idx ON snapshot(created_at);
";

/// True when the schedule table has not been created yet.
pub(crate) fn is_fresh(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schedule'",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

/// Create all tables and seed schedules and vocabularies in one transaction.
pub(crate) fn setup(conn: &mut Connection, seed: &[ScheduleSeed]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO schedule (name, date_format, keep, precedence) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for schedule in seed {
            stmt.execute(params![
                schedule.name,
                schedule.date_format,
                schedule.keep,
                schedule.precedence
            ])?;
        }

        let mut stmt = tx.prepare_cached("INSERT INTO snapshot_status (status) VALUES (?1)")?;
        for status in SnapshotStatus::ALL {
            stmt.execute(params![status.as_str()])?;
        }

        let mut stmt = tx.prepare_cached("INSERT INTO relationship_status (status) VALUES (?1)")?;
        for status in RelationshipStatus::ALL {
            stmt.execute(params![status.as_str()])?;
        }
    }

    tx.commit()
}
