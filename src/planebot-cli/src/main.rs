//! planebot - Plane issue notifications and slash commands for Slack.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use planebot_cli::{digest_once, notify_once, run, today};
use planebot_notify::BridgeConfig;

/// Plane to Slack notification bridge
#[derive(Parser)]
#[command(name = "planebot")]
#[command(about = "Sends Plane issue notifications to Slack and handles slash commands")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Environment file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// User mapping CSV file (overrides USER_MAPPING_PATH)
    #[arg(long)]
    mapping_path: Option<PathBuf>,

    /// Enable the webhook receiver on this address (overrides WEBHOOK_ADDR)
    #[arg(long)]
    webhook_addr: Option<SocketAddr>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Run the Slack listener, the daily scheduler and the webhook receiver
    Run,
    /// Message every mapped assignee once, then exit
    Notify,
    /// Post the digest once, then exit
    Digest {
        /// Date shown in the digest header (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load .env before the logger so RUST_LOG can come from it.
    let env_loaded = match &args.env_file {
        Some(path) => dotenvy::from_path(path).map(|()| Some(path.clone())),
        None => dotenvy::dotenv().map(Some),
    };

    setup_logging(&args.log_level, args.json_logs);

    match env_loaded {
        Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) if e.not_found() && args.env_file.is_none() => {}
        Err(e) => warn!("Failed to load environment file: {}", e),
    }

    let mut config = match BridgeConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config from environment: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = args.mapping_path {
        config = config.with_mapping_path(path);
    }
    if let Some(addr) = args.webhook_addr {
        config = config.with_webhook_addr(addr);
    }

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!(
                "Starting planebot (schedule '{}' in {})",
                config.schedule_cron, config.schedule_timezone
            );
            info!("Press Ctrl+C to stop");

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_tx.send_replace(true);
            });

            run(config, shutdown_rx).await
        }
        Command::Notify => notify_once(&config).await.map(|report| {
            info!(
                "Sent {} notifications ({} unmapped assignees, {} failed)",
                report.sent,
                report.unmapped.len(),
                report.failed.len()
            );
        }),
        Command::Digest { date } => match date.map(Ok).unwrap_or_else(|| today(&config)) {
            Ok(date) => digest_once(&config, date).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("planebot failed: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
