use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reftrack_core::AttemptRecord;
use reftrack_runner::{Config, HostRuntime, ReferrerBroadcast};
use reftrack_storage::AttemptStore;
use reftrack_storage_sqlite::SqliteAttemptStore;

#[derive(Parser)]
#[command(name = "reftrack", version)]
struct Cli {
    /// Directory holding .reftrack/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .reftrack/ with a default config and an empty attempt store
    Init,

    /// Validate the config and the host environment
    Doctor,

    /// Show the pending attempt record, if any
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Deliver an install referrer and run until tracking is settled
    Track {
        #[arg(long)]
        referrer: String,
        /// Override the platform capability from the config
        #[arg(long)]
        capability: Option<u32>,
        /// Deliver as a secondary receiver (no forwarding)
        #[arg(long)]
        secondary: bool,
    },

    /// Resume a tracking sequence left by a previous process
    Resume,

    /// Drop the pending attempt record
    Clear,
}

fn init_logging(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(root: &Path, cfg: &Config) -> Result<SqliteAttemptStore> {
    SqliteAttemptStore::open(&cfg.db_path(root))
}

fn print_record(record: Option<&AttemptRecord>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    match record {
        None => println!("No pending tracking attempt"),
        Some(r) => {
            println!("Referrer: {}", r.referrer);
            println!("Attempts made: {}", r.attempt_count);
            println!("Last failure: {:?}", r.last_failure_reason);
        }
    }
    Ok(())
}

fn run_host(root: &Path, cfg: &Config, start: impl FnOnce(&mut HostRuntime) -> Result<()>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let mut host = HostRuntime::build(cfg, root, rt.handle().clone())?;
    start(&mut host)?;
    rt.block_on(host.run_until_idle())?;
    print_record(host.pending_record()?.as_ref(), false)?;
    // The blocking HTTP client must be dropped outside of the runtime.
    drop(host);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    let cfg = Config::load_or_init(&root)?;
    init_logging(&cfg);

    match cli.cmd {
        Command::Init => {
            open_store(&root, &cfg)?;
            println!("Initialized reftrack in {}", root.display());
        }
        Command::Doctor => {
            reftrack_runner::doctor(&root, &cfg)?;
            println!("OK");
        }
        Command::Status { json } => {
            let record = open_store(&root, &cfg)?.load()?;
            print_record(record.as_ref(), json)?;
        }
        Command::Track { referrer, capability, secondary } => {
            run_host(&root, &cfg, |host| {
                if let Some(c) = capability {
                    host.receiver_mut().set_capability(c);
                }
                let broadcast = ReferrerBroadcast { referrer: Some(referrer), forwarding_allowed: !secondary };
                let started = if secondary {
                    host.receiver().handle_broadcast(&broadcast)
                } else {
                    host.receiver().on_receive(&broadcast)
                };
                match started {
                    None => println!("Referrer ignored"),
                    Some(true) => println!("Tracking started ({:?})", host.receiver().strategy_kind()),
                    Some(false) => return Err(anyhow!("tracking could not be scheduled")),
                }
                Ok(())
            })?;
        }
        Command::Resume => {
            run_host(&root, &cfg, |host| {
                match host.resume_pending() {
                    None => println!("Nothing to resume"),
                    Some(outcome) => println!("Resumed: {outcome:?}"),
                }
                Ok(())
            })?;
        }
        Command::Clear => {
            open_store(&root, &cfg)?.clear()?;
            println!("Cleared");
        }
    }

    Ok(())
}
