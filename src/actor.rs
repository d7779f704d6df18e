//! Physical snapshot operations.
//!
//! The engine only talks to a [`SnapshotActor`]; the store has already
//! recorded intent by the time any method here runs. [`BtrfsActor`] drives
//! `btrfs subvolume` for read-only snapshots of one source subvolume into a
//! snapshot directory.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::ActorError;

/// Default location of the btrfs binary.
pub const DEFAULT_BTRFS: &str = "/bin/btrfs";

pub trait SnapshotActor {
    fn name(&self) -> &'static str;

    /// Whether the underlying tooling can be used at all.
    fn available(&self) -> bool;

    /// Materialize a read-only snapshot of the source called `name`.
    fn create(&self, name: &str) -> Result<(), ActorError>;

    /// Remove the snapshot called `name`.
    fn delete(&self, name: &str) -> Result<(), ActorError>;
}

pub struct BtrfsActor {
    btrfs: PathBuf,
    source: PathBuf,
    snapshots: PathBuf,
}

impl BtrfsActor {
    pub fn new(btrfs: impl Into<PathBuf>, source: impl Into<PathBuf>, snapshots: impl Into<PathBuf>) -> Self {
        let source: PathBuf = source.into();
        BtrfsActor {
            btrfs: btrfs.into(),
            // normalized, drops a trailing slash
            source: source.components().collect(),
            snapshots: snapshots.into(),
        }
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.snapshots.join(name)
    }

    fn create_command(&self, name: &str) -> Command {
        let mut cmd = Command::new(&self.btrfs);
        cmd.arg("subvolume")
            .arg("snapshot")
            .arg("-r")
            .arg(&self.source)
            .arg(self.snapshot_path(name));
        cmd
    }

    fn delete_command(&self, name: &str) -> Command {
        let mut cmd = Command::new(&self.btrfs);
        cmd.arg("subvolume").arg("delete").arg(self.snapshot_path(name));
        cmd
    }
}

impl SnapshotActor for BtrfsActor {
    fn name(&self) -> &'static str {
        "btrfs"
    }

    fn available(&self) -> bool {
        Command::new(&self.btrfs)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create(&self, name: &str) -> Result<(), ActorError> {
        run(self.create_command(name))
    }

    fn delete(&self, name: &str) -> Result<(), ActorError> {
        run(self.delete_command(name))
    }
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn run(mut cmd: Command) -> Result<(), ActorError> {
    let command = describe(&cmd);
    debug!(%command, "running");

    let output = cmd.output().map_err(|source| ActorError::Spawn {
        command: command.clone(),
        source,
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ActorError::Failed {
        command,
        status: output.status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> BtrfsActor {
        BtrfsActor::new("/sbin/btrfs", "/data/home/", "/data/.snapshots")
    }

    #[test]
    fn create_command_takes_readonly_snapshot_into_snapshot_dir() {
        let cmd = actor().create_command("2024-05-17.000");
        assert_eq!(
            describe(&cmd),
            "/sbin/btrfs subvolume snapshot -r /data/home /data/.snapshots/2024-05-17.000"
        );
    }

    #[test]
    fn delete_command_targets_snapshot_path() {
        let cmd = actor().delete_command("2024-05-17.000");
        assert_eq!(describe(&cmd), "/sbin/btrfs subvolume delete /data/.snapshots/2024-05-17.000");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let actor = BtrfsActor::new("/nonexistent/btrfs", "/src", "/snaps");
        assert!(!actor.available());
        let err = actor.create("x").unwrap_err();
        assert!(matches!(err, ActorError::Spawn { .. }));
    }
}
