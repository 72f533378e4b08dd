//! Focus Guard - keeps browsing on task during a focus session.
//!
//! Opens the database, restores any session that was running when the
//! process stopped, and serves the localhost API for the browser extension.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use focus_core::{HttpClassifier, NotificationManager, RestoreOutcome};
use focus_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use focus_storage::Database;

/// Focus Guard - session-scoped content relevance and blocking engine
#[derive(Parser, Debug)]
#[command(name = "focus-guard", version, about)]
struct Args {
    /// Host for the extension API
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port for the extension API
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Database file (defaults to the app data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to the console as well as to files
    #[arg(long)]
    console: bool,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "focusguard", "focus-guard").map(|dirs| dirs.data_dir().join("logs"))
}

fn filter_directive(args: &Args) -> String {
    let log_level = if args.debug { "debug" } else { &args.log_level };
    format!(
        "focus_guard={0},focus_core={0},focus_storage={0},focus_server={0},warn",
        log_level
    )
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(args)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("focus-guard")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug || args.console {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn open_database(args: &Args) -> anyhow::Result<Database> {
    let db = match &args.db_path {
        Some(path) => Database::with_path(path),
        None => Database::new(),
    };
    db.context("Failed to open database")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Focus Guard starting");

    let db = open_database(&args)?;
    let remote = HttpClassifier::new().context("Failed to build HTTP client")?;
    let state = AppState::new(db, Arc::new(remote), Arc::new(NotificationManager::new()));

    match state.engine.sessions().restore().await {
        Ok(RestoreOutcome::Resumed(session)) => {
            tracing::info!(task = %session.task_description, "Session restored");
        }
        Ok(RestoreOutcome::Expired) => tracing::info!("Previous session expired while stopped"),
        Ok(RestoreOutcome::NoSession) => {}
        Err(e) => tracing::error!(error = %e, "Failed to restore session"),
    }

    let config = ServerConfig::default()
        .with_host(args.host.clone())
        .with_port(args.port);
    let server = Server::with_state(config, state)?;
    tracing::info!(addr = %server.addr(), "Extension API ready");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested; the active session is kept for the next start");
        }
    }

    Ok(())
}
