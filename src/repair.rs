//! Store vs filesystem verification.
//!
//! Finds where the durable record and the snapshot directory disagree:
//! - missing: tracked as `created` but absent on disk
//! - stranded: present and `created`, but no tier holds it any more
//!   (a failed delete during a tick)
//! - untracked: an entry in the snapshot directory the store knows nothing
//!   about
//!
//! Dry run (default) only reports. Execute marks missing snapshots and
//! deletes stranded ones through the actor. Untracked entries are never
//! touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::actor::SnapshotActor;
use crate::error::{Error, Result};
use crate::store::{SnapshotStatus, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    DryRun,
    Execute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Missing { id: i64, filename: String },
    Stranded { id: i64, filename: String },
    Untracked { path: PathBuf },
}

#[derive(Debug, Default, Serialize)]
pub struct RepairResult {
    pub findings: Vec<Finding>,
    pub repaired: Vec<String>,
    pub errors: Vec<String>,
}

pub fn run<A: SnapshotActor + ?Sized>(
    store: &mut Store,
    actor: &A,
    snapshots_dir: &Path,
    mode: RepairMode,
) -> Result<RepairResult> {
    // an unmounted snapshot volume would otherwise mark everything missing
    if !snapshots_dir.is_dir() {
        return Err(Error::Config(format!(
            "snapshot directory {} does not exist",
            snapshots_dir.display()
        )));
    }

    let mut result = RepairResult::default();
    let tracked = store.list_snapshots(None, false)?;

    let mut missing = Vec::new();
    for snapshot in &tracked {
        if !snapshots_dir.join(&snapshot.filename).exists() {
            result.findings.push(Finding::Missing {
                id: snapshot.id,
                filename: snapshot.filename.clone(),
            });
            missing.push(snapshot.id);
        }
    }

    let stranded: Vec<_> = store
        .stranded_snapshots()?
        .into_iter()
        .filter(|s| !missing.contains(&s.id))
        .collect();
    for snapshot in &stranded {
        result.findings.push(Finding::Stranded {
            id: snapshot.id,
            filename: snapshot.filename.clone(),
        });
    }

    let known: HashSet<&str> = tracked.iter().map(|s| s.filename.as_str()).collect();
    for entry in WalkDir::new(snapshots_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => {
                let name = entry.file_name().to_string_lossy();
                if !name.starts_with('.') && !known.contains(name.as_ref()) {
                    result.findings.push(Finding::Untracked {
                        path: entry.path().to_path_buf(),
                    });
                }
            }
            Err(e) => result.errors.push(format!("walking {}: {e}", snapshots_dir.display())),
        }
    }

    if mode == RepairMode::DryRun {
        return Ok(result);
    }

    if !missing.is_empty() {
        store.set_snapshot_status(&missing, SnapshotStatus::Missing)?;
        for finding in &result.findings {
            if let Finding::Missing { filename, .. } = finding {
                info!(snapshot = %filename, "marked missing");
                result.repaired.push(format!("marked missing: {filename}"));
            }
        }
    }

    for snapshot in stranded {
        match actor.delete(&snapshot.filename) {
            Ok(()) => {
                store.mark_snapshots_deleted(&[snapshot.id])?;
                info!(snapshot = %snapshot.filename, "stranded snapshot deleted");
                result.repaired.push(format!("deleted: {}", snapshot.filename));
            }
            Err(e) => {
                warn!(snapshot = %snapshot.filename, error = %e, "stranded snapshot delete failed");
                result.errors.push(format!("delete {}: {e}", snapshot.filename));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActorError;
    use crate::store::{ScheduleSeed, StatusFilter};
    use std::fs;

    /// Deletes snapshot directories for real so the next pass sees the result.
    struct DirActor {
        root: PathBuf,
    }

    impl SnapshotActor for DirActor {
        fn name(&self) -> &'static str {
            "dir"
        }

        fn available(&self) -> bool {
            true
        }

        fn create(&self, name: &str) -> Result<(), ActorError> {
            fs::create_dir(self.root.join(name)).map_err(|source| ActorError::Spawn {
                command: format!("mkdir {name}"),
                source,
            })
        }

        fn delete(&self, name: &str) -> Result<(), ActorError> {
            fs::remove_dir(self.root.join(name)).map_err(|source| ActorError::Spawn {
                command: format!("rmdir {name}"),
                source,
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        store: Store,
        held: i64,
        gone: i64,
        stranded: i64,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let seed = [ScheduleSeed { name: "daily", date_format: "%Y%m%d", keep: 5, precedence: 1 }];
        let mut store = Store::open_in_memory_with_seed(&seed).unwrap();
        let daily = store.list_schedules().unwrap().remove(0).id;

        let held = store.create_snapshot("held", 100).unwrap();
        store.create_relationship(held, daily, "1").unwrap();
        let gone = store.create_snapshot("gone", 200).unwrap();
        store.create_relationship(gone, daily, "2").unwrap();
        let stranded = store.create_snapshot("stranded", 300).unwrap();
        let r = store.create_relationship(stranded, daily, "3").unwrap();
        store.expire_relationships(&[r]).unwrap();

        fs::create_dir(dir.path().join("held")).unwrap();
        fs::create_dir(dir.path().join("stranded")).unwrap();
        fs::create_dir(dir.path().join("stray")).unwrap();
        fs::write(dir.path().join(".gensnap.db"), b"").unwrap();

        Fixture { dir, store, held, gone, stranded }
    }

    fn status(store: &Store, id: i64) -> SnapshotStatus {
        store.get_snapshots(&[id]).unwrap().remove(0).status
    }

    #[test]
    fn dry_run_reports_without_changes() {
        let mut f = fixture();
        let actor = DirActor { root: f.dir.path().to_path_buf() };

        let result = run(&mut f.store, &actor, f.dir.path(), RepairMode::DryRun).unwrap();

        assert_eq!(
            result.findings,
            [
                Finding::Missing { id: f.gone, filename: "gone".to_string() },
                Finding::Stranded { id: f.stranded, filename: "stranded".to_string() },
                Finding::Untracked { path: f.dir.path().join("stray") },
            ]
        );
        assert!(result.repaired.is_empty());
        assert_eq!(status(&f.store, f.gone), SnapshotStatus::Created);
        assert!(f.dir.path().join("stranded").exists());
    }

    #[test]
    fn execute_marks_missing_and_deletes_stranded() {
        let mut f = fixture();
        let actor = DirActor { root: f.dir.path().to_path_buf() };

        let result = run(&mut f.store, &actor, f.dir.path(), RepairMode::Execute).unwrap();

        assert_eq!(result.repaired, ["marked missing: gone", "deleted: stranded"]);
        assert!(result.errors.is_empty());
        assert_eq!(status(&f.store, f.gone), SnapshotStatus::Missing);
        assert_eq!(status(&f.store, f.stranded), SnapshotStatus::Deleted);
        assert_eq!(status(&f.store, f.held), SnapshotStatus::Created);
        assert!(!f.dir.path().join("stranded").exists());
        assert!(f.dir.path().join("stray").exists());

        // a missing snapshot no longer counts towards the keep window
        let daily = f.store.list_schedules().unwrap().remove(0).id;
        let live = f.store.find_relationships(daily, &StatusFilter::live(), 0).unwrap();
        assert_eq!(live.len(), 1);

        let again = run(&mut f.store, &actor, f.dir.path(), RepairMode::DryRun).unwrap();
        assert_eq!(again.findings, [Finding::Untracked { path: f.dir.path().join("stray") }]);
    }

    #[test]
    fn absent_snapshot_directory_is_an_error() {
        let mut f = fixture();
        let actor = DirActor { root: f.dir.path().to_path_buf() };
        let absent = f.dir.path().join("not-mounted");

        let err = run(&mut f.store, &actor, &absent, RepairMode::Execute).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(status(&f.store, f.gone), SnapshotStatus::Created);
    }
}
