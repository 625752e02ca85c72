use clap::Parser;
use sidecar_helper::config::{Args, LogConfig};
use sidecar_helper::lifecycle::{Coordinator, QuitOutcome, TokioSleeper};
use sidecar_helper::server::{shutdown_channel, spawn_signal_handler};
use sidecar_helper::sidecar::HttpSidecarClient;
use sidecar_helper::status::{init_kube_client, KubeStatusProvider};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialize tracing
///
/// `RUST_LOG` wins when set; otherwise `--log-level`. JSON lines unless
/// `--log-pretty`. Caller location is always reported at debug and below.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.to_string()));
    let verbose = log.level == LevelFilter::DEBUG || log.level == LevelFilter::TRACE;
    let report_caller = log.report_caller || verbose;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(report_caller)
        .with_line_number(report_caller);

    if log.pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_config());

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sidecar-helper");

    let config = match args.into_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    // reqwest and kube both use rustls; pick ring as the process-wide provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let client = match init_kube_client(config.kube.kubeconfig.clone(), config.kube.insecure).await
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Kubernetes client initialized");

    let sidecar = match HttpSidecarClient::new(&config.sidecar) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to create sidecar client");
            return Err(e.into());
        }
    };

    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let signal_handle = match spawn_signal_handler(shutdown_controller) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "Failed to register signal handlers");
            return Err(e.into());
        }
    };

    let coordinator = Coordinator::new(
        config,
        Arc::new(sidecar),
        Arc::new(KubeStatusProvider::new(client)),
        Arc::new(TokioSleeper),
        shutdown_signal,
    );

    let summary = coordinator.run().await;
    signal_handle.abort();

    match summary.quit {
        QuitOutcome::Sent => info!("Sidecar asked to quit, exiting"),
        QuitOutcome::Failed => info!("Watched containers stopped, quit call failed"),
        QuitOutcome::Skipped => info!(readiness = ?summary.readiness, "Cancelled, exiting"),
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
