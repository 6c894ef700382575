use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use osvol::config::Config;
use osvol::openstack::http::api_error_hint;
use osvol::resource::{self, VolumeArgs, VolumeChanges, WaitTimings};
use osvol::wait::Status;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Manage OpenStack block storage volumes
#[derive(Parser, Debug)]
#[command(name = "osvol", version = osvol::VERSION, about, long_about = None)]
struct Args {
    /// OpenStack region to use
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    timings: TimingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct TimingArgs {
    /// Give up waiting after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Seconds to wait before the first status poll
    #[arg(long, global = true)]
    delay: Option<u64>,

    /// Minimum seconds between status polls
    #[arg(long, global = true)]
    min_poll_interval: Option<u64>,
}

impl TimingArgs {
    fn apply(&self, mut timings: WaitTimings) -> WaitTimings {
        if let Some(secs) = self.timeout {
            timings.create_timeout = Duration::from_secs(secs);
            timings.delete_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.delay {
            timings.delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.min_poll_interval {
            timings.min_poll_interval = Duration::from_secs(secs);
        }
        timings
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a volume and wait until it is available
    Create(CreateArgs),
    /// Show a volume
    Show { id: String },
    /// Update name, description or metadata of a volume
    Update(UpdateArgs),
    /// Delete volumes and wait until they are gone
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Wait for a volume to reach a status
    Wait(WaitArgs),
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ClapArgs, Debug)]
struct CreateArgs {
    /// Size in GB
    #[arg(long)]
    size: u32,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Metadata entry as key=value (repeatable)
    #[arg(long = "metadata", value_parser = parse_key_val)]
    metadata: Vec<(String, String)>,
    #[arg(long)]
    snapshot_id: Option<String>,
    #[arg(long)]
    source_vol_id: Option<String>,
    #[arg(long)]
    image_id: Option<String>,
    #[arg(long)]
    volume_type: Option<String>,
    #[arg(long)]
    availability_zone: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Replace metadata with these key=value entries (repeatable)
    #[arg(long = "metadata", value_parser = parse_key_val)]
    metadata: Vec<(String, String)>,
    /// Remove all metadata
    #[arg(long, conflicts_with = "metadata")]
    clear_metadata: bool,
}

#[derive(ClapArgs, Debug)]
struct WaitArgs {
    id: String,
    /// Status that ends the wait (repeatable); `deleted` waits for the volume to disappear
    #[arg(long)]
    target: Vec<String>,
    /// Status that keeps the wait going (repeatable)
    #[arg(long)]
    pending: Vec<String>,
    /// Treat the volume disappearing as reaching the target (same as `--target deleted`)
    #[arg(long)]
    until_absent: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Remember a default region
    SetRegion { region: String },
    /// Set the volume API endpoint for a region
    SetEndpoint { region: String, url: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return None;
    };

    let file = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Cannot open log file {:?}: {}, logging to stderr", path, e);
                None
            }
        }
    });
    let to_file = file.is_some();

    let (non_blocking, guard) = match file {
        Some(file) => tracing_appender::non_blocking(file),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(!to_file)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("osvol started with log level: {:?}", level);

    Some(guard)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = api_error_hint(&err) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();
    let region = config.effective_region(args.region.as_deref());

    let command = match args.command {
        Command::Config { action } => return run_config(&mut config, &region, &action),
        command => command,
    };

    tracing::info!("Using region: {}", region);
    let client = config.block_storage_client(&region)?;
    let timings = args.timings.apply(config.timings());

    match command {
        Command::Create(create) => {
            let volume_args = VolumeArgs {
                size: create.size,
                name: create.name,
                description: create.description,
                metadata: create.metadata.into_iter().collect(),
                snapshot_id: create.snapshot_id,
                source_vol_id: create.source_vol_id,
                image_id: create.image_id,
                volume_type: create.volume_type,
                availability_zone: create.availability_zone,
            };
            let volume = resource::create(&client, &volume_args, &timings).await?;
            print_json(&volume)
        }
        Command::Show { id } => match resource::read(&client, &id).await? {
            Some(volume) => print_json(&volume),
            None => anyhow::bail!("Volume ({}) not found", id),
        },
        Command::Update(update) => {
            let metadata = if update.clear_metadata {
                Some(BTreeMap::new())
            } else if update.metadata.is_empty() {
                None
            } else {
                Some(update.metadata.into_iter().collect())
            };
            let changes = VolumeChanges {
                name: update.name,
                description: update.description,
                metadata,
            };
            let volume = resource::update(&client, &update.id, &changes).await?;
            print_json(&volume)
        }
        Command::Delete { ids } => {
            let results =
                join_all(ids.iter().map(|id| resource::delete(&client, id, &timings))).await;

            let mut failed = 0;
            for (id, result) in ids.iter().zip(results) {
                match result {
                    Ok(()) => print_json(&json!({ "id": id, "deleted": true }))?,
                    Err(err) => {
                        eprintln!("Error: {err:#}");
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} of {} deletions failed", failed, ids.len());
            }
            Ok(())
        }
        Command::Wait(wait) => {
            let mut target: Vec<Status> =
                wait.target.iter().map(|s| resource::parse_target(s)).collect();
            if wait.until_absent {
                target.push(Status::Absent);
            }
            let pending = wait.pending.into_iter().map(Status::from).collect();

            let outcome = resource::wait_for_status(
                &client,
                &wait.id,
                target,
                pending,
                timings.create_timeout,
                timings.min_poll_interval,
            )
            .await?;

            print_json(&json!({
                "id": wait.id,
                "status": outcome.status.to_string(),
                "polls": outcome.polls,
                "volume": outcome.object,
            }))
        }
        Command::Config { .. } => unreachable!("config commands return before client setup"),
    }
}

fn run_config(config: &mut Config, region: &str, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let timings = config.timings();
            print_json(&json!({
                "region": region,
                "endpoints": config.endpoints,
                "token_configured": config.token.is_some(),
                "create_timeout_secs": timings.create_timeout.as_secs(),
                "delete_timeout_secs": timings.delete_timeout.as_secs(),
                "delay_secs": timings.delay.as_secs(),
                "min_poll_interval_secs": timings.min_poll_interval.as_secs(),
            }))
        }
        ConfigAction::SetRegion { region } => config.set_region(region),
        ConfigAction::SetEndpoint { region, url } => {
            url::Url::parse(url).with_context(|| format!("Invalid endpoint URL: {}", url))?;
            config.endpoints.insert(region.clone(), url.clone());
            config.save()
        }
    }
}
