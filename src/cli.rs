use clap::{Args, CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gensnap")]
#[command(about = "Generational btrfs snapshots with tiered retention")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (default: ~/.config/gensnap/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Take a snapshot if any schedule is due and expire old ones
    Run(RunArgs),

    /// List tracked snapshots and the schedules holding them
    List(ListArgs),

    /// Show the retention schedules of a store
    Schedules(SchedulesArgs),

    /// Compare the store with the snapshot directory
    Verify(VerifyArgs),
}

/// Locates the retention store of a subvolume.
#[derive(Args)]
pub struct StoreArgs {
    /// The subvolume to be managed
    pub subvolume: PathBuf,

    /// Path to the database (default: <SUBVOLUME>/.gensnap.db)
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Directory the snapshots are stored in
    pub snapshots: PathBuf,

    /// strftime pattern for snapshot names, with %q (quarter) and
    /// %{count} (snapshots already taken today) [default: %Y-%m-%d.%{count}]
    #[arg(long, value_name = "FMT")]
    pub name_format: Option<String>,

    /// Path to the btrfs binary [default: /bin/btrfs]
    #[arg(long, value_name = "PATH")]
    pub btrfs: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ListArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Include deleted, failed and missing snapshots
    #[arg(long, default_value_t = false)]
    pub all: bool,

    /// Only snapshots newer than this ("36h", "2w")
    #[arg(long, value_name = "DURATION")]
    pub since: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct SchedulesArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Directory the snapshots are stored in
    pub snapshots: PathBuf,

    /// Mark missing snapshots and delete stranded ones instead of only reporting
    #[arg(long, default_value_t = false)]
    pub repair: bool,

    /// Path to the btrfs binary [default: /bin/btrfs]
    #[arg(long, value_name = "PATH")]
    pub btrfs: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl VerifyArgs {
    /// returns true if findings should only be reported
    pub fn is_dry_run(&self) -> bool {
        !self.repair
    }
}

impl Cli {
    /// Parse `args`, treating a leading positional that names no subcommand
    /// as the start of `run`, so `gensnap <SUBVOLUME> <SNAPSHOTS>` keeps
    /// working from existing crontabs.
    pub fn parse_with_default<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(with_default_command(args))
    }
}

/// Insert `run` after the program name when the first positional argument
/// is not a subcommand. Values of `--config` are skipped.
pub fn with_default_command<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let command = Cli::command();

    let mut skip_value = false;
    let mut first_positional = None;
    for (index, arg) in args.iter().enumerate().skip(1) {
        if skip_value {
            skip_value = false;
            continue;
        }
        let text = arg.to_string_lossy();
        if text == "--config" {
            skip_value = true;
        } else if !text.starts_with('-') {
            first_positional = Some(text.into_owned());
            break;
        }
    }

    let Some(first) = first_positional else {
        return args;
    };
    let is_subcommand = first == "help"
        || command
            .get_subcommands()
            .any(|sub| sub.get_name() == first || sub.get_all_aliases().any(|alias| alias == first));

    if !is_subcommand && !args.is_empty() {
        args.insert(1, OsString::from("run"));
    }
    args
}
