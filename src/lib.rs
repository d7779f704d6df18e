//! Generational snapshot retention.
//!
//! Each run ("tick") renders the current time under every schedule's date
//! format, takes a snapshot if any schedule's current period is still
//! untagged, and deletes snapshots once every schedule that held them has
//! expired them.

pub mod actor;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod repair;
pub mod report;
pub mod store;

pub use error::{Error, Result};
