mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use node_conntrack::config::Config;
use node_conntrack::export::{TrackerMetrics, registry, serve};
use node_conntrack::listen::{ListenError, listen};
use node_conntrack::state::{ConnectionTracker, Limits};

fn main() -> Result<()> {
    let config = cli::Args::parse().into_config()?;

    // RUST_LOG wins over the verbose flag.
    let default_filter = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting node-conntrack");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let tracker = Arc::new(ConnectionTracker::new(Limits::from(&config)));
    let metrics = TrackerMetrics::new().context("creating metrics")?;
    let registry = registry(tracker.clone(), &metrics).context("registering metrics")?;

    let mut server = tokio::spawn({
        let addr = config.bind_addr();
        let tracker = tracker.clone();
        let cancel = cancel.clone();
        async move { serve(&addr, registry, tracker, cancel).await }
    });

    let outcome = tokio::select! {
        result = listen(tracker, metrics, &config, cancel.clone()) => result,
        joined = &mut server => {
            cancel.cancel();
            joined.context("metrics server task")??;
            return Ok(());
        }
    };

    cancel.cancel();
    server.await.context("metrics server task")??;

    match outcome {
        Ok(()) | Err(ListenError::Cancelled) => {
            tracing::info!("node-conntrack stopped");
            Ok(())
        }
        Err(e) => Err(e).context("listening for conntrack events"),
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    cancel.cancel();
}
