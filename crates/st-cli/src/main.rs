//! CLI entry point for synaptree.
//!
//! This binary exposes the workspace graph core: one-shot scans, status
//! snapshots, and a line-delimited JSON session over stdio for a rendering
//! frontend.
//!
//! # Usage
//!
//! ```bash
//! synaptree [OPTIONS] <COMMAND>
//!
//! # Print the graph of the current directory
//! synaptree scan --pretty
//!
//! # Print version-control status of a workspace
//! synaptree status --path ~/src/project
//!
//! # Serve a frontend over stdin/stdout with live updates
//! synaptree serve --path ~/src/project
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use st_core::{Config, GitStatus, NodeId, UiMessage};
use st_scanner::{ScanReport, Scanner};
use st_session::{Outbound, Session, decode_line, encode_line, run_session};
use st_watcher::{GitStatusSource, StatusSource};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const INBOUND_CAPACITY: usize = 64;
const OUTBOUND_CAPACITY: usize = 1024;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Workspace file graph with live filesystem and version-control updates.
#[derive(Parser)]
#[command(name = "synaptree", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Workspace root.
    #[arg(short, long, global = true, env = "SYNAPTREE_PATH", default_value = ".")]
    path: Utf8PathBuf,

    /// JSON configuration file. Defaults apply when omitted.
    #[arg(long, global = true, env = "SYNAPTREE_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored log output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace once and print the graph as JSON.
    Scan {
        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,

        /// Print scan statistics to stderr.
        #[arg(short, long)]
        summary: bool,
    },

    /// Print the non-clean version-control status of every entry as JSON.
    Status {
        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,
    },

    /// Serve a frontend: UI messages in on stdin, graph messages out on
    /// stdout, one JSON object per line.
    Serve {
        /// Disable file watching (snapshots only).
        #[arg(long)]
        no_watch: bool,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default. Logs go
/// to stderr; stdout carries data only.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file, or defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
fn load_config(path: Option<&Utf8Path>) -> color_eyre::Result<Config> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!(path = %path, "Loaded configuration");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Validates the workspace root and returns its canonical form.
///
/// # Errors
///
/// Returns an error if the path doesn't exist or isn't a directory.
fn resolve_root(path: &Utf8Path) -> color_eyre::Result<Utf8PathBuf> {
    if !path.exists() {
        return Err(eyre!("Path does not exist: {path}"));
    }
    if !path.is_dir() {
        return Err(eyre!("Path is not a directory: {path}"));
    }
    Ok(path.canonicalize_utf8()?)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs a one-shot scan and prints the graph.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or output fails.
async fn run_scan(
    root: &Utf8Path,
    config: &Config,
    pretty: bool,
    summary: bool,
) -> color_eyre::Result<()> {
    info!(root = %root, "Starting scan");

    let scanner = Scanner::new(Arc::new(config.workspace_config()?), &config.scan);
    let report = scanner.scan_with_report(root).await;

    let json = if pretty {
        serde_json::to_string_pretty(&report.data)?
    } else {
        serde_json::to_string(&report.data)?
    };
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;

    if summary {
        print_summary(&report)?;
    }
    Ok(())
}

/// Prints a status snapshot of the workspace.
///
/// # Errors
///
/// Returns an error if the repository cannot be read or output fails.
async fn run_status(root: Utf8PathBuf, pretty: bool) -> color_eyre::Result<()> {
    info!(root = %root, "Reading status");

    let source = GitStatusSource::new(root);
    let snapshot = tokio::task::spawn_blocking(move || source.snapshot()).await??;
    let sorted: BTreeMap<NodeId, GitStatus> = snapshot.into_iter().collect();

    let json = if pretty {
        serde_json::to_string_pretty(&sorted)?
    } else {
        serde_json::to_string(&sorted)?
    };
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

/// Serves a session over stdio until stdin closes or a signal arrives.
///
/// # Errors
///
/// Returns an error if the session cannot start, the session fails, or
/// stdout becomes unwritable.
async fn run_serve(root: Utf8PathBuf, mut config: Config, no_watch: bool) -> color_eyre::Result<()> {
    if no_watch {
        config.watch.enabled = false;
    }
    info!(root = %root, watch = config.watch.enabled, "Starting session");

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (session, deltas) = Session::new(&root, config, out_tx)?;
    let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
    let shutdown = CancellationToken::new();

    let reader = tokio::spawn(read_inbound(in_tx));
    let writer = tokio::spawn(write_outbound(out_rx));
    spawn_signal_handler(shutdown.clone());

    // The session owns the outbound sender; the writer drains and stops
    // once it is dropped.
    let result = run_session(session, deltas, in_rx, shutdown).await;
    reader.abort();
    writer.await??;
    result?;

    info!("Session ended");
    Ok(())
}

async fn read_inbound(tx: mpsc::Sender<UiMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode_line(&line) {
                Ok(Some(msg)) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Ignoring malformed message"),
            },
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(err) => {
                error!(error = %err, "Failed to read stdin");
                break;
            }
        }
    }
}

async fn write_outbound(mut rx: mpsc::Receiver<Outbound>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let line = match encode_line(&msg) {
            Ok(line) => line,
            Err(err) => {
                error!(command = msg.command(), error = %err, "Failed to encode message");
                continue;
            }
        };
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("Received shutdown signal");
        token.cancel();
    });
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints scan statistics and skipped entries to stderr.
fn print_summary(report: &ScanReport) -> std::io::Result<()> {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let stats = &report.stats;

    writeln!(handle)?;
    writeln!(handle, "Scan Summary")?;
    writeln!(handle, "============")?;
    writeln!(handle, "Nodes:        {}", stats.nodes())?;
    writeln!(handle, "  Directories: {}", stats.directories)?;
    writeln!(handle, "  Files:       {}", stats.files)?;
    writeln!(handle, "Ignored:      {}", stats.ignored)?;
    writeln!(handle, "Errors:       {}", stats.errors)?;
    writeln!(handle, "Elapsed:      {:.1?}", report.elapsed)?;

    if !report.errors.is_empty() {
        writeln!(handle)?;
        writeln!(handle, "Skipped ({}):", report.errors.len())?;
        for err in &report.errors {
            writeln!(handle, "  {err}")?;
        }
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Before anything that can panic.
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_color);

    let config = load_config(cli.config.as_deref())?;
    let root = resolve_root(&cli.path)?;

    match cli.command {
        Commands::Scan { pretty, summary } => run_scan(&root, &config, pretty, summary).await,
        Commands::Status { pretty } => run_status(root, pretty).await,
        Commands::Serve { no_watch } => run_serve(root, config, no_watch).await,
    }
}
