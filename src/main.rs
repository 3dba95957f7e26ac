//! Wallhack tunnel binary.
//!
//! One process, two modes: `wallhack --server` multiplexes tunnel clients on
//! supervisor-inherited TLS listeners; plain `wallhack` (client mode) dials
//! the server named by `WALLHACK_SERVER` and bridges the local TUN over it.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wallhack_service::Service;

/// Wallhack tunnel CLI.
#[derive(Parser)]
#[command(
    name = "wallhack",
    version,
    about = "Point-to-point layer-3 tunnel over mutually-authenticated TLS"
)]
struct Cli {
    /// Run as the tunnel server. Default is client mode.
    #[arg(long)]
    server: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // May already be installed when embedded in tests; either way one
    // provider is in place before any TLS config is built.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    init_tracing();

    let cli = Cli::parse();

    let service = match Service::from_env() {
        Ok(service) => service,
        Err(err) => {
            error!(error = %err, "supervisor setup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    service.mark_ready();

    let result: Result<(), String> = if cli.server {
        wallhack_server::run_with_shutdown(&service, None, shutdown)
            .await
            .map_err(|err| err.to_string())
    } else {
        wallhack_client::run(&service, shutdown)
            .await
            .map_err(|err| err.to_string())
    };

    service.status("stopping");
    service.mark_stopping();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "wallhack failed");
            ExitCode::FAILURE
        }
    }
}

/// Waits for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}

/// Initializes the tracing subscriber: env-filtered, compact, to stderr.
/// Under a supervisor stderr lands in the journal.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
