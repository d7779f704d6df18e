//! Error types for gensnap.
//!
//! Store and configuration failures are fatal and abort a tick before any
//! further mutation. Physical snapshot failures are a separate type
//! ([`ActorError`]) because the engine records them instead of propagating.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid date format pattern: {pattern:?}")]
    InvalidFormat { pattern: String },

    /// A status vocabulary row is absent from an existing store.
    #[error("store is missing the {0:?} status row")]
    MissingStatus(&'static str),

    /// A schedule with a finer date format than the one before it in
    /// precedence order. Overlapping periods of different units (weeks and
    /// months) are not detected.
    #[error("schedule {finer:?} is finer than {coarser:?} but has a higher precedence")]
    ScheduleOrder { finer: String, coarser: String },

    #[error("btrfs binary not usable: {}", .0.display())]
    BtrfsUnavailable(PathBuf),

    #[error("invalid duration: {0}")]
    Duration(#[from] humantime::DurationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of a physical snapshot operation.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}
