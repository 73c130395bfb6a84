//! IGM Bridge - process entry point
//!
//! Loads the configuration, starts logging, builds the clients and runs one
//! dispatch epoch. Exits 0 on SIGINT/SIGTERM and non-zero when the epoch
//! ends any other way, leaving restarts to the supervisor.

#![forbid(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use igm_bridge::{BridgeConfig, Cli, EpochEnd, run_session_bridge};
use igm_telemetry::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit status when the broker closed the feed.
const EXIT_REMOTE_CLOSED: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = BridgeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_cli(&cli);

    init_logging(&config.telemetry()).context("initializing logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "igm-bridge starting");
    if !config.pxgrid_ca_verify {
        warn!(
            host = %config.pxgrid_host,
            "pxgrid_ca_verify is false: control-plane and pub/sub certificates are not verified"
        );
    }

    let control = Arc::new(
        config
            .control_plane_client()
            .context("building control-plane client")?,
    );
    let meraki = Arc::new(config.meraki_client().context("building Meraki client")?);
    let mapper = config.mapper();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!(error = %err, "Signal handler failed; shutting down"),
        }
        trigger.cancel();
    });

    match run_session_bridge(control, mapper, meraki, cancel).await {
        Ok(EpochEnd::Cancelled) => Ok(ExitCode::SUCCESS),
        Ok(EpochEnd::RemoteClosed) => {
            warn!("Session feed closed by the broker");
            Ok(ExitCode::from(EXIT_REMOTE_CLOSED))
        }
        Err(err) => {
            error!(error = %err, class = ?err.class(), "Bridge stopped");
            Err(err).context("session bridge failed")
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("waiting for SIGINT"),
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("waiting for SIGINT")
    }
}
