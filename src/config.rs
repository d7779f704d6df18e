use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::actor::DEFAULT_BTRFS;
use crate::cli::StoreArgs;
use crate::error::{Error, Result};
use crate::format::{self, DEFAULT_NAME_FORMAT};

/// File name of the store when the database path is a directory.
pub const DB_FILE_NAME: &str = ".gensnap.db";

/// Shape of the optional TOML config file.
///
/// There is no database key: each subvolume carries its own store.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub name_format: Option<String>,
    pub btrfs: Option<PathBuf>,
}

impl FileConfig {
    /// Load `explicit`, or the default config file if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(FileConfig::default()),
            },
        };

        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// ~/.config/gensnap/config.toml or the platform equivalent
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "gensnap").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub struct Config {
    pub subvolume: PathBuf,
    pub database: PathBuf,
    pub name_format: String,
    pub btrfs: PathBuf,
}

impl Config {
    /// Command line values win over the config file, which wins over defaults.
    /// The name format is not checked here; see [`Config::check_name_format`].
    pub fn new(store: &StoreArgs, file: &FileConfig, name_format: Option<&str>, btrfs: Option<&Path>) -> Result<Self> {
        let name_format = name_format
            .or(file.name_format.as_deref())
            .unwrap_or(DEFAULT_NAME_FORMAT)
            .to_string();

        let btrfs = btrfs
            .or(file.btrfs.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_BTRFS))
            .to_path_buf();

        Ok(Config {
            subvolume: store.subvolume.clone(),
            database: database_path(&store.subvolume, store.database.as_deref()),
            name_format,
            btrfs,
        })
    }

    /// Only commands that name snapshots need a valid name format.
    pub fn check_name_format(&self) -> Result<()> {
        format::validate(&self.name_format)
    }
}

/// The `--database` override or the subvolume; a directory gets
/// [`DB_FILE_NAME`] appended.
pub fn database_path(subvolume: &Path, database: Option<&Path>) -> PathBuf {
    let path = database.unwrap_or(subvolume);
    if path.is_dir() {
        path.join(DB_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_args(subvolume: &Path) -> StoreArgs {
        StoreArgs {
            subvolume: subvolume.to_path_buf(),
            database: None,
        }
    }

    #[test]
    fn database_defaults_to_hidden_file_in_subvolume() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(database_path(dir.path(), None), dir.path().join(DB_FILE_NAME));
    }

    #[test]
    fn database_override_file_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.db");
        assert_eq!(database_path(Path::new("/unused"), Some(&file)), file);
    }

    #[test]
    fn database_override_directory_gets_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        assert_eq!(
            database_path(dir.path(), Some(other.path())),
            other.path().join(DB_FILE_NAME)
        );
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(&store_args(dir.path()), &FileConfig::default(), None, None).unwrap();
        assert_eq!(config.name_format, DEFAULT_NAME_FORMAT);
        assert_eq!(config.btrfs, PathBuf::from(DEFAULT_BTRFS));
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::parse("name_format = \"%Y%m%d\"\nbtrfs = \"/usr/sbin/btrfs\"\n").unwrap();

        let from_file = Config::new(&store_args(dir.path()), &file, None, None).unwrap();
        assert_eq!(from_file.name_format, "%Y%m%d");
        assert_eq!(from_file.btrfs, PathBuf::from("/usr/sbin/btrfs"));

        let from_flags = Config::new(
            &store_args(dir.path()),
            &file,
            Some("%Y.%{count}"),
            Some(Path::new("/opt/btrfs")),
        )
        .unwrap();
        assert_eq!(from_flags.name_format, "%Y.%{count}");
        assert_eq!(from_flags.btrfs, PathBuf::from("/opt/btrfs"));
    }

    #[test]
    fn invalid_name_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(&store_args(dir.path()), &FileConfig::default(), Some("%Y%"), None).unwrap();
        let err = config.check_name_format().unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }

    #[test]
    fn bad_name_format_in_file_does_not_block_store_config() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::parse("name_format = \"%Y%\"\n").unwrap();

        let config = Config::new(&store_args(dir.path()), &file, None, None).unwrap();
        assert_eq!(config.database, dir.path().join(DB_FILE_NAME));
        assert!(config.check_name_format().is_err());
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(matches!(FileConfig::parse("database = \"/tmp/x.db\""), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
