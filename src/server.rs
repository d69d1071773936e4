use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::rest::{self, AppState};
use crate::config::ControllerConfig;
use crate::domain::events::{self, Notifier};
use crate::domain::fleet::FleetRegistry;
use crate::domain::queue::WorkQueue;
use crate::domain::watcher::Watcher;

pub async fn run(config: ControllerConfig) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Garrison controller starting");

    // Shared state
    let notifier = Notifier::new(256);
    let queue = Arc::new(WorkQueue::new(notifier.clone()));
    let fleet = Arc::new(FleetRegistry::new(notifier.clone()));

    let app_state = AppState {
        queue: queue.clone(),
        fleet: fleet.clone(),
        started: Instant::now(),
    };

    let app: Router = rest::router(app_state).layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    // Deterministic shutdown for every background loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Event log subscriber
    tokio::spawn(events::run_log_subscriber(notifier.clone()));

    // Lifecycle watcher
    {
        let watcher = Watcher::new(
            fleet.clone(),
            config.watcher_tick_secs,
            config.host_silence_secs,
        );
        tokio::spawn(watcher.run(shutdown_rx.clone()));
    }

    // Queue purge + stale-in-progress sweep
    if config.purge_interval_secs > 0 {
        let purge_queue = queue.clone();
        let interval_secs = config.purge_interval_secs;
        let stale_after = chrono::Duration::seconds(config.stale_in_progress_secs as i64);
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = purge_queue.delete_completed().await;
                        if removed > 0 {
                            info!(removed, "purged terminal work items");
                        }
                        let swept = purge_queue.sweep_stale_in_progress(stale_after).await;
                        if !swept.is_empty() {
                            warn!(count = swept.len(), "failed stale in-progress work items");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    let _ = shutdown_tx.send(true);
    info!("Garrison controller stopped");
    Ok(())
}

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
