use std::process::ExitCode;

use chrono::Utc;
use gensnap::actor::{BtrfsActor, SnapshotActor};
use gensnap::cli::{Cli, Command, ListArgs, RunArgs, SchedulesArgs, StoreArgs, VerifyArgs};
use gensnap::config::{Config, FileConfig};
use gensnap::engine::Engine;
use gensnap::report::{self, ScheduleRow, SnapshotRow};
use gensnap::repair::{self, RepairMode};
use gensnap::store::{StatusFilter, Store};
use gensnap::{Error, Result};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "gensnap=debug" } else { "gensnap=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Open an existing store; read-only commands never create one.
fn open_existing(config: &Config) -> Result<Store> {
    if !config.database.exists() {
        return Err(Error::Config(format!(
            "no store at {}, run `gensnap run` first",
            config.database.display()
        )));
    }
    Store::open(&config.database)
}

fn btrfs_actor(config: &Config, snapshots: &std::path::Path) -> Result<BtrfsActor> {
    let actor = BtrfsActor::new(&config.btrfs, &config.subvolume, snapshots);
    if !actor.available() {
        return Err(Error::BtrfsUnavailable(config.btrfs.clone()));
    }
    Ok(actor)
}

/// Returns false when the tick recorded an actor failure.
fn run_tick(args: RunArgs, file: &FileConfig) -> Result<bool> {
    let config = Config::new(&args.store, file, args.name_format.as_deref(), args.btrfs.as_deref())?;
    config.check_name_format()?;
    let actor = btrfs_actor(&config, &args.snapshots)?;
    let mut store = Store::open(&config.database)?;

    let tick = Engine::new(&mut store, &actor, &config.name_format).tick(Utc::now())?;
    report::print_tick(&tick, args.json)?;

    Ok(tick.errors.is_empty())
}

fn list(args: ListArgs, file: &FileConfig) -> Result<bool> {
    let config = store_config(&args.store, file)?;
    let store = open_existing(&config)?;

    let since = match &args.since {
        Some(raw) => {
            let window = humantime::parse_duration(raw)?;
            let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
            Some(Utc::now().timestamp().saturating_sub(window))
        }
        None => None,
    };

    let rows = store
        .list_snapshots(since, args.all)?
        .into_iter()
        .map(|snapshot| {
            let tiers = store.active_tiers(snapshot.id)?;
            Ok(SnapshotRow { snapshot, tiers })
        })
        .collect::<Result<Vec<_>>>()?;

    report::print_snapshots(&rows, args.json)?;
    Ok(true)
}

fn schedules(args: SchedulesArgs, file: &FileConfig) -> Result<bool> {
    let config = store_config(&args.store, file)?;
    let store = open_existing(&config)?;
    let live = StatusFilter::live();

    let rows = store
        .list_schedules()?
        .into_iter()
        .map(|schedule| {
            let active = store.find_relationships(schedule.id, &live, 0)?.len();
            Ok(ScheduleRow { schedule, active })
        })
        .collect::<Result<Vec<_>>>()?;

    report::print_schedules(&rows, args.json)?;
    Ok(true)
}

fn verify(args: VerifyArgs, file: &FileConfig) -> Result<bool> {
    let config = Config::new(&args.store, file, None, args.btrfs.as_deref())?;
    let mut store = open_existing(&config)?;

    let mode = if args.is_dry_run() {
        RepairMode::DryRun
    } else {
        RepairMode::Execute
    };

    // a dry run never calls the actor, so btrfs need not be installed
    let actor = match mode {
        RepairMode::Execute => btrfs_actor(&config, &args.snapshots)?,
        RepairMode::DryRun => BtrfsActor::new(&config.btrfs, &config.subvolume, &args.snapshots),
    };
    let result = repair::run(&mut store, &actor, &args.snapshots, mode)?;

    report::print_repair(&result, args.is_dry_run(), args.json)?;
    Ok(result.errors.is_empty())
}

fn store_config(store: &StoreArgs, file: &FileConfig) -> Result<Config> {
    Config::new(store, file, None, None)
}

fn main() -> ExitCode {
    let cli = Cli::parse_with_default(std::env::args_os());
    init_tracing(cli.verbose);

    let outcome = FileConfig::load(cli.config.as_deref()).and_then(|file| match cli.command {
        Command::Run(args) => run_tick(args, &file),
        Command::List(args) => list(args, &file),
        Command::Schedules(args) => schedules(args, &file),
        Command::Verify(args) => verify(args, &file),
    });

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
