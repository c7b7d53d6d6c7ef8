use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use camrelay_aws::S3ObjectStore;
use camrelay_daemon::config::CamrelayConfig;
use camrelay_daemon::pidfile::PidFile;
use camrelay_relay::{Ledger, Relay, RelayError};
use camrelay_storage::ObjectStore;

/// Relay camera captures from an FTP drop directory to S3.
#[derive(Parser, Debug)]
#[command(name = "camrelay", version, about = "Relay camera captures to object storage")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "camrelay.toml", env = "CAMRELAY_CONFIG")]
    config: PathBuf,

    /// Override `relay.source_directory`.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Override `storage.bucket`.
    #[arg(long)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Scan and upload until interrupted (default).
    Run,
    /// Upload everything already complete, then exit.
    Once,
    /// Validate the configuration and check the bucket is reachable.
    Check,
    /// List files that exhausted their retries.
    Failed,
    /// Clear failure markers so failed files are retried.
    Retry,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = CamrelayConfig::load(&cli.config)?;
    config.apply_overrides(cli.source, cli.bucket);

    let telemetry_guard = camrelay_daemon::telemetry::init(&config.telemetry);
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Once => once(&config).await,
        Commands::Check => check(&config).await,
        Commands::Failed => list_failed(&config),
        Commands::Retry => retry_failed(&config).await,
    };

    telemetry_guard.shutdown();
    result
}

async fn build_relay(config: &CamrelayConfig) -> Result<Relay, Box<dyn std::error::Error>> {
    let relay_config = config.relay_config()?;
    let store = S3ObjectStore::new(config.storage.s3.clone()).await;
    Ok(Relay::new(relay_config, Arc::new(store))?)
}

async fn run(config: &CamrelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let relay = build_relay(config).await?;
    let _pid_file = config
        .daemon
        .pid_file
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match relay.run(shutdown).await {
        Ok(()) => Ok(()),
        Err(e) => Err(fatal(e)),
    }
}

async fn once(config: &CamrelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut relay = build_relay(config).await?;
    let summary = relay.run_once().await.map_err(fatal)?;
    info!(
        uploaded = summary.uploaded,
        retrying = summary.retrying,
        failed = summary.failed,
        local_errors = summary.local_errors,
        deferred = summary.deferred,
        "single run complete"
    );
    Ok(())
}

async fn check(config: &CamrelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let relay_config = config.relay_config()?;
    if !relay_config.source_directory.is_dir() {
        return Err(format!(
            "source directory {} does not exist",
            relay_config.source_directory.display()
        )
        .into());
    }
    let store = S3ObjectStore::new(config.storage.s3.clone()).await;
    store.health_check(&relay_config.bucket).await?;
    info!(
        source = %relay_config.source_directory.display(),
        bucket = %relay_config.bucket,
        "configuration ok"
    );
    Ok(())
}

fn list_failed(config: &CamrelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Ledger::rebuild(config.source_directory()?);
    let failed = ledger.failed_entries();
    for entry in &failed {
        println!(
            "{}\t{}\t{}\t{}",
            entry.path.display(),
            entry.attempts,
            entry.key.as_deref().unwrap_or("-"),
            entry.last_error.as_deref().unwrap_or("-"),
        );
    }
    info!(count = failed.len(), "failed captures listed");
    Ok(())
}

async fn retry_failed(config: &CamrelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Ledger::rebuild(config.source_directory()?);
    let reset = ledger.reset_failed().await?;
    info!(count = reset.len(), "failure markers cleared");
    Ok(())
}

fn fatal(e: RelayError) -> Box<dyn std::error::Error> {
    match &e {
        RelayError::Permanent(upload) => {
            error!(error = %upload, error_class = upload.class(), "fatal configuration error, stopping");
        }
        other => error!(error = %other, "relay stopped with error"),
    }
    e.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
