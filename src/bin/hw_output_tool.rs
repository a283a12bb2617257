//! Inspect and prepare baseparameter images
//!
//! Usage:
//!   hw-output-tool dump /dev/block/by-name/baseparameter
//!   hw-output-tool init ./baseparameter.img
//!   hw-output-tool --config /vendor/etc/hw_output.json probe

use clap::{Parser, Subcommand};
use hw_output::baseparameter::{LAYOUT_VERSION, RECORD_LEN};
use hw_output::{BackingStore, BaseParameter, HwOutputConfig};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hw-output-tool")]
#[command(about = "Inspect the display baseparameter partition", long_about = None)]
struct Args {
    /// Output config (JSON); built-in defaults when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode an image and print it as JSON
    Dump { path: PathBuf },
    /// Write a blank, full-length image
    Init {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show which configured backing path is usable
    Probe,
}

fn dump(path: &Path) -> hw_output::Result<()> {
    let image = std::fs::read(path)?;
    debug!("Read {} bytes from {}", image.len(), path.display());
    let record = BaseParameter::decode(&image)?;
    let json = serde_json::json!({
        "layout_version": LAYOUT_VERSION,
        "main": record.main,
        "aux": record.aux,
    });
    let text = serde_json::to_string_pretty(&json)
        .map_err(|e| hw_output::Error::Config(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn init(path: &Path, force: bool) -> hw_output::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = options.open(path)?;
    file.set_len(RECORD_LEN)?;
    file.sync_all()?;
    info!("Wrote blank {} byte baseparameter image to {}", RECORD_LEN, path.display());
    Ok(())
}

fn probe(config: &HwOutputConfig) -> hw_output::Result<()> {
    let store = BackingStore::locate(&config.backing_paths)?;
    println!("{}", store.path().display());
    store.read()?;
    info!("{} holds a full record", store.path().display());
    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => HwOutputConfig::load_or_default(path),
        None => HwOutputConfig::default(),
    };

    let result = match &args.command {
        Command::Dump { path } => dump(path),
        Command::Init { path, force } => init(path, *force),
        Command::Probe => probe(&config),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
