//! Stablecoin Reporter
//!
//! Weekly USD stablecoin supply and USDC transfer-volume share report,
//! delivered to a Feishu group bot.

mod config;
mod pipeline;
mod schedule;

use clap::Parser;
use config::AppConfig;
use pipeline::ReportPipeline;
use stablecoin_alerts::DEFAULT_HISTORY_PATH;
use stablecoin_feeds::{ReqwestTransport, RetryingClient};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Stablecoin Reporter CLI
#[derive(Parser, Debug)]
#[command(name = "stablecoin-reporter")]
#[command(about = "Weekly USD stablecoin supply and USDC volume share report", long_about = None)]
struct Args {
    /// Run regardless of the Monday 07:00 schedule (same as FORCE_RUN=1)
    #[arg(long, default_value_t = false)]
    force: bool,

    /// History file path
    #[arg(long, default_value = DEFAULT_HISTORY_PATH)]
    history_path: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Environment file loaded before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

/// Result of loading the environment file, logged once logging is up.
#[derive(Debug)]
enum EnvFile {
    Loaded,
    Missing,
    Failed(dotenvy::Error),
}

/// Load `path` into the process environment. Existing variables win.
fn load_env_file(path: &Path) -> EnvFile {
    match dotenvy::from_path(path) {
        Ok(()) => EnvFile::Loaded,
        Err(e) if e.not_found() => EnvFile::Missing,
        Err(e) => EnvFile::Failed(e),
    }
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG, when set, refines the level chosen on the command line
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    // Before logging, so a RUST_LOG from the file applies
    let env_file = load_env_file(&args.env_file);
    init_logging(&args.log_level);

    match env_file {
        EnvFile::Loaded => debug!(path = %args.env_file.display(), "Loaded environment file"),
        EnvFile::Missing => debug!(path = %args.env_file.display(), "No environment file"),
        EnvFile::Failed(e) => {
            warn!(path = %args.env_file.display(), error = %e, "Failed to load environment file")
        }
    }

    let config = AppConfig::from_env().with_overrides(args.force, Some(args.history_path));
    debug!(config = ?config, "Configuration loaded");

    let transport = match ReqwestTransport::new(config.request_timeout) {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, "Failed to initialize HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let client = RetryingClient::new(Arc::new(transport));

    let outcome = ReportPipeline::new(&config, client)
        .run(schedule::report_now())
        .await;
    info!(exit_status = outcome.exit_status(), "Reporter finished");
    ExitCode::from(outcome.exit_status())
}
