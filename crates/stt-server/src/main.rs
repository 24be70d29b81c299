// Logging behavior:
// - Writes logs to both stderr and a daily-rotated file under the configured log directory.
// - Default log level is INFO. Control via RUST_LOG:
//   * RUST_LOG=info                      # Standard logging (default, recommended)
//   * RUST_LOG=debug                     # Verbose debugging (includes per-cycle decisions)
//   * RUST_LOG=stt_core=trace            # Fine-grained per-module control
// - The log directory is created on startup if missing; file output uses a non-blocking writer.
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::Parser;
use tokio::sync::Mutex;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stt_core::transcriber::{FixtureTranscriber, Transcriber};
use stt_core::types::{Segment, Word};
use stt_foundation::{AppState, HealthMonitor, ShutdownHandler, StateManager};
use stt_server::config::{FixtureModelKind, ServerSettings};

fn init_logging(
    log_dir: &str,
    log_level: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "stt-server.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let file_layer = fmt::layer().with_writer(non_blocking_file).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Prune rotated log files older than `retention_days` days. `0` disables pruning.
fn prune_old_logs(log_dir: &str, retention_days: u64) {
    if retention_days == 0 {
        tracing::debug!("log retention disabled (retention_days=0)");
        return;
    }

    let cutoff = match SystemTime::now().checked_sub(Duration::from_secs(retention_days * 24 * 60 * 60)) {
        Some(t) => t,
        None => return,
    };

    let logs_dir = Path::new(log_dir);
    if !logs_dir.exists() {
        return;
    }

    match fs::read_dir(logs_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    if name.starts_with("stt-server.log.") {
                        if let Ok(meta) = entry.metadata() {
                            if let Ok(modified) = meta.modified() {
                                if modified < cutoff {
                                    match fs::remove_file(&path) {
                                        Ok(_) => tracing::info!("removed old log file: {}", path.display()),
                                        Err(e) => tracing::warn!(
                                            "failed to remove old log {}: {}",
                                            path.display(),
                                            e
                                        ),
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Err(e) => tracing::warn!("failed to read log directory for pruning: {}", e),
    }
}

#[derive(Parser, Debug)]
#[command(name = "stt-server", author, version, about = "Streaming speech-to-text session server")]
struct Cli {
    /// TCP port to listen on (overrides configuration).
    #[arg(long)]
    port: Option<u16>,

    /// Dump the resolved configuration (file + env + CLI merged) and exit.
    #[arg(long = "list-config")]
    list_config: bool,

    /// Override the rotated-log retention window, in days (0 disables pruning).
    #[arg(long = "log-retention-days")]
    log_retention_days: Option<u64>,
}

/// The real STT model is out of scope for this service; until a model
/// binding is wired in, sessions run against an in-process fixture selected
/// by configuration, matching the reference's own local-testing affordance.
fn build_fixture(kind: FixtureModelKind) -> Box<dyn Transcriber> {
    match kind {
        FixtureModelKind::Silent => Box::new(FixtureTranscriber::silent()),
        FixtureModelKind::Echo => Box::new(FixtureTranscriber::new(|_, _| {
            vec![Segment {
                start: 0.0,
                end: 1.0,
                text: "fixture transcript.".to_string(),
                avg_log_prob: -0.1,
                no_speech_prob: 0.05,
                words: vec![
                    Word { start: 0.0, end: 0.5, text: "fixture".to_string() },
                    Word { start: 0.5, end: 1.0, text: "transcript.".to_string() },
                ],
            }]
        })),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = ServerSettings::load().unwrap_or_else(|e| {
        eprintln!("failed to load settings: {e}, using compiled defaults");
        ServerSettings::default()
    });

    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(retention) = cli.log_retention_days {
        settings.log_retention_days = retention;
    }

    let _log_guard = init_logging(&settings.log_dir, &settings.log_level)?;
    prune_old_logs(&settings.log_dir, settings.log_retention_days);
    tracing::info!("starting stt-server");

    settings.validate()?;

    if cli.list_config {
        tracing::info!(?settings, "resolved configuration");
        println!("{settings:#?}");
        return Ok(());
    }

    let state_manager = StateManager::new();
    let _health_monitor = HealthMonitor::new(Duration::from_secs(10)).start();
    let shutdown = ShutdownHandler::new().install().await;

    state_manager.transition(AppState::Running)?;
    tracing::info!("application state: Running");

    let transcriber = build_fixture(settings.fixture_model);
    let shared_transcriber = Arc::new(Mutex::new(transcriber));

    stt_server::server::run(settings, shared_transcriber, shutdown).await?;

    state_manager.transition(AppState::Stopping)?;
    state_manager.transition(AppState::Stopped)?;
    tracing::debug!("shutdown complete");

    Ok(())
}
