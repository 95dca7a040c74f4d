mod api;
mod app;
mod cache;
mod config;
mod event;
mod net;
mod queue;
mod sync;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "refls")]
#[command(about = "An offline-first client for a reflections journal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/refls/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unavailable: writes go straight to the queue
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List reflections, newest first
  List {
    /// Only show reflections whose content contains this keyword
    #[arg(long)]
    search: Option<String>,
    /// Only show reflections from this day (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,
  },
  /// Add a new reflection
  Add {
    /// Reflection text (at least 10 characters)
    content: String,
  },
  /// Delete a reflection by id
  Delete { id: u64 },
  /// Replay queued reflections once
  Sync,
  /// Show connectivity, queue, and cache state
  Status,
  /// Keep watching connectivity and replay the queue when it returns
  Watch {
    /// Seconds between connectivity probes
    #[arg(long, default_value_t = 5)]
    interval: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_tracing()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let mut app = app::App::new(config, args.offline).await?;

  match args.command {
    Command::List { search, date } => app.list(search.as_deref(), date.as_deref()).await,
    Command::Add { content } => app.add(&content).await,
    Command::Delete { id } => app.delete(id).await,
    Command::Sync => app.sync().await,
    Command::Status => app.status().await,
    Command::Watch { interval } => app.watch(Duration::from_secs(interval)).await,
  }
}

/// Log to a file in the data directory so command output stays clean.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("refls");

  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(log_dir, "refls.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refls=info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
