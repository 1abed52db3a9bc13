use clap::Parser;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toot_mirror::config::{self, ConfigError};
use toot_mirror::error::SyncError;
use toot_mirror::mastodon::MastodonClient;
use toot_mirror::state::{RunLock, StateStore};
use toot_mirror::sync::{self, RunOptions, SyncReport};
use toot_mirror::twitter::TwitterClient;

const DATA_DIR_NAME: &str = ".toot-mirror";
const LOG_MAX_BYTES: usize = 5_000_000;
const LOG_BACKUPS: usize = 9;

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror new Mastodon posts to Twitter, then exit")]
struct Args {
    /// Profile name; selects the config, state and lock files
    #[arg(short, long, default_value = "default")]
    profile: String,

    /// Path to YAML config file [default: ~/.toot-mirror/<profile>.yaml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append log output to FILE instead of stdout, rotating at 5 MB
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Log what would be posted without posting or saving state
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// With --dry-run, still advance the saved position
    #[arg(short, long, requires = "dry_run")]
    update: bool,

    /// Verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

/// `path` plus up to `backups` older files named `path.1`, `path.2`, ...
fn rotating_log(path: &Path, max_bytes: usize, backups: usize) -> FileRotate<AppendCount> {
    FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::Bytes(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "toot_mirror=debug,info"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match &args.log {
        Some(path) => {
            let log = rotating_log(path, LOG_MAX_BYTES, LOG_BACKUPS);
            builder.with_ansi(false).with_writer(Mutex::new(log)).init();
        }
        None => builder.with_writer(io::stdout).init(),
    }
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

fn lock_path(state_path: &Path) -> PathBuf {
    state_path.with_extension("lock")
}

async fn run(args: &Args) -> Result<Option<SyncReport>, SyncError> {
    let data_dir = data_dir();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(format!("{}.yaml", args.profile)));
    let cfg = config::load(&config_path)?;
    info!(profile = %args.profile, config = %config_path.display(), "loaded config");

    let state_path = cfg
        .sync
        .state_file
        .clone()
        .unwrap_or_else(|| data_dir.join(format!("{}.state.json", args.profile)));

    let Some(_lock) = RunLock::try_acquire(lock_path(&state_path))? else {
        info!(state = %state_path.display(), "another run holds the lock; exiting");
        return Ok(None);
    };

    let mut store = StateStore::new(state_path);
    let state = store.load()?;

    let timeline = MastodonClient::from_config(&cfg.source)
        .map_err(|e| ConfigError::Client("Mastodon", e.to_string()))?;
    let destination = TwitterClient::from_config(&cfg.destination)
        .map_err(|e| ConfigError::Client("Twitter", format!("{:#}", e)))?;

    let options = RunOptions {
        dry_run: args.dry_run,
        update: args.update,
    };
    let report = sync::run_once(&cfg, &timeline, &destination, &mut store, state, options).await?;
    Ok(Some(report))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, code = err.exit_code(), "sync failed");
            ExitCode::from(err.exit_code())
        }
    }
}
