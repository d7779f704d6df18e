//! Status vocabularies for snapshots and relationships.
//!
//! Both vocabularies live in their own tables so the stored rows stay
//! self-describing. The ids are resolved once when the store opens and kept
//! in [`StatusIds`]; reads join the tables and parse the text back.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Created,
    Deleted,
    Failed,
    Missing,
}

impl SnapshotStatus {
    pub const ALL: [SnapshotStatus; 4] = [
        SnapshotStatus::Created,
        SnapshotStatus::Deleted,
        SnapshotStatus::Failed,
        SnapshotStatus::Missing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Created => "created",
            SnapshotStatus::Deleted => "deleted",
            SnapshotStatus::Failed => "failed",
            SnapshotStatus::Missing => "missing",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Active,
    Expired,
}

impl RelationshipStatus {
    pub const ALL: [RelationshipStatus; 2] = [RelationshipStatus::Active, RelationshipStatus::Expired];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl FromSql for SnapshotStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        SnapshotStatus::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl FromSql for RelationshipStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        RelationshipStatus::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// Which snapshot and relationship statuses count when querying.
///
/// An empty list leaves that side unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    pub snapshot: Vec<SnapshotStatus>,
    pub relationship: Vec<RelationshipStatus>,
}

impl StatusFilter {
    /// Active relationship on a snapshot not yet known to be gone.
    pub fn live() -> Self {
        StatusFilter {
            snapshot: vec![SnapshotStatus::Created],
            relationship: vec![RelationshipStatus::Active],
        }
    }

    pub fn any() -> Self {
        StatusFilter {
            snapshot: Vec::new(),
            relationship: Vec::new(),
        }
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::live()
    }
}

/// Row ids of the status vocabularies, indexed by enum discriminant.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusIds {
    snapshot: [i64; 4],
    relationship: [i64; 2],
}

impl StatusIds {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        let mut snapshot = [0; 4];
        for status in SnapshotStatus::ALL {
            snapshot[status as usize] = lookup(conn, "snapshot_status", status.as_str())?;
        }

        let mut relationship = [0; 2];
        for status in RelationshipStatus::ALL {
            relationship[status as usize] = lookup(conn, "relationship_status", status.as_str())?;
        }

        Ok(StatusIds { snapshot, relationship })
    }

    pub(crate) fn snapshot(&self, status: SnapshotStatus) -> i64 {
        self.snapshot[status as usize]
    }

    pub(crate) fn relationship(&self, status: RelationshipStatus) -> i64 {
        self.relationship[status as usize]
    }
}

fn lookup(conn: &Connection, table: &str, status: &'static str) -> Result<i64> {
    let sql = format!("SELECT id FROM {table} WHERE status = ?1");
    conn.query_row(&sql, params![status], |row| row.get(0))
        .optional()?
        .ok_or(Error::MissingStatus(status))
}
