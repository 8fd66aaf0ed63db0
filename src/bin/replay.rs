//! `tablemux-replay` Binary
//!
//! Replays a recorded event stream (one JSON `StreamEvent` per line) through
//! the dispatcher and prints every table's records to stdout.
//!
//! ## Usage
//!
//! ```bash
//! # Replay with default settings
//! cargo run --bin tablemux-replay -- --events session.jsonl
//!
//! # Per-table workers and a 5 second deadline
//! cargo run --bin tablemux-replay -- --events session.jsonl --mode per-table-worker --timeout-ms 5000
//! ```
//!
//! ## Tracing
//!
//! Set `TABLEMUX_TRACE=1` to write logs to `tablemux_trace.log`
//! (`TABLEMUX_TRACE_FILE`, `TABLEMUX_TRACE_LEVEL`, `TABLEMUX_TRACE_JSON`
//! override the file, level and format).

use anyhow::Context;
use clap::{Parser, ValueEnum};
use futures_util::stream;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::OnceLock;
use tablemux::config::LoggingConfig;
use tablemux::protocol::read_json_lines;
use tablemux::{Config, DispatchMode, PrintingMuxer, StreamSession};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Inline,
    PerTableWorker,
}

#[derive(Debug, Parser)]
#[command(name = "tablemux-replay", about = "Replay a recorded multi-table result stream")]
struct Args {
    /// JSON-lines file of stream events
    #[arg(long)]
    events: PathBuf,

    /// Configuration file (defaults to tablemux.toml + tablemux.local.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session deadline in milliseconds (0 = none)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Dispatch mode override
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Skip the per-table schema header line
    #[arg(long)]
    no_header: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load().unwrap_or_else(|_| Config::default()),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.session.timeout_ms = timeout_ms;
    }
    if let Some(mode) = args.mode {
        config.dispatch.mode = match mode {
            ModeArg::Inline => DispatchMode::Inline,
            ModeArg::PerTableWorker => DispatchMode::PerTableWorker,
        };
    }

    init_tracing(&config.logging);

    let file = File::open(&args.events)
        .with_context(|| format!("failed to open {}", args.events.display()))?;
    let events = stream::iter(read_json_lines(BufReader::new(file)));

    let muxer = PrintingMuxer::new(std::io::stdout()).with_header(!args.no_header);
    let report = StreamSession::new(muxer, events, &config)
        .stream()
        .await
        .context("session failed")?;

    for (table_id, error) in &report.table_errors {
        eprintln!("table {table_id}: {error}");
    }
    eprintln!(
        "{} tables opened, {} completed, {} records in {:?}",
        report.tables_opened, report.tables_completed, report.records_delivered, report.elapsed
    );

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} table errors", report.table_errors.len())
    }
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    let enabled = env::var("TABLEMUX_TRACE").ok().is_some_and(|v| v != "0");
    if !enabled {
        return;
    }

    let log_path =
        env::var("TABLEMUX_TRACE_FILE").unwrap_or_else(|_| "tablemux_trace.log".to_string());

    let json = env::var("TABLEMUX_TRACE_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    let level = env::var("TABLEMUX_TRACE_LEVEL")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ERROR: Unable to open TABLEMUX_TRACE_FILE '{log_path}': {e}");
            return;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = TRACE_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(non_blocking.clone())
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
