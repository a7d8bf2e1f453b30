//! Quill CLI
//!
//! Thin driver around quill-core for exercising the log writer from a
//! shell: it emits a mix of durable and buffered lines on all three
//! channels, flushes, closes, and prints where the files went.
//!
//! ## Usage
//!
//! ```bash
//! # Write 10 lines per channel under ./logs
//! quill
//!
//! # Somewhere else, more lines, production batching
//! quill --dir /tmp/applogs -n 50 --production
//!
//! # Size-capped files with truncation instead of backups
//! quill --max-file-size 4096 --truncate
//!
//! # Load everything from a TOML file instead of flags
//! quill --config quill.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use quill_core::{Config, Dispatcher, Level, Mode};

/// Quill - buffered, rotating, per-channel file log writer
#[derive(Parser)]
#[command(name = "quill")]
#[command(version = "0.1.0")]
#[command(about = "Exercise the quill log writer")]
struct Cli {
    /// Increase verbosity of quill's own diagnostics (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Base log directory
    #[arg(short, long, default_value = "logs")]
    dir: PathBuf,

    /// TOML configuration file; overrides the other flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force production batching instead of reading QUILL_ENV
    #[arg(long)]
    production: bool,

    /// Lines to write per channel
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Flush timer period in seconds (0 disables the timer)
    #[arg(long, default_value_t = 600)]
    flush_secs: u64,

    /// Maximum size of an active file in bytes (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_file_size: u64,

    /// Truncate a full file in place instead of rotating to a backup
    #[arg(long)]
    truncate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let base_dir = config.base_dir.clone();
    let mode = config.mode;
    let info_dir = config.channel_dir(Level::Info);
    let error_dir = config.channel_dir(Level::Error);
    let trace_dir = config.channel_dir(Level::Trace);

    let logs = Dispatcher::new(config);

    logs.info("run started", true).await?;
    for i in 0..cli.count {
        logs.info(&format!("processing item {i}"), false).await?;
        logs.trace(&format!("item {i} details: state=ok attempt=1"), false)
            .await?;
        if i % 5 == 0 {
            logs.error(
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("item {i} upstream timed out"),
                ),
                true,
            )
            .await?;
        }
    }
    logs.info("run complete", true).await?;

    logs.flush_all().await?;
    logs.close().await?;

    println!("Quill demo run ({mode:?} batching)");
    println!();
    println!("Wrote {} buffered lines per channel under {}", cli.count, base_dir.display());
    println!("  info:  {}", info_dir.display());
    println!("  error: {}", error_dir.display());
    println!("  trace: {}", trace_dir.display());

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        return Ok(config);
    }

    let mode = if cli.production {
        Mode::Production
    } else {
        Mode::from_env()
    };
    Ok(Config {
        base_dir: cli.dir.clone(),
        mode,
        flush_interval: Duration::from_secs(cli.flush_secs),
        max_file_size: cli.max_file_size,
        truncate_on_full: cli.truncate,
    })
}
