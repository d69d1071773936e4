//! Host agent daemon: one check-in loop, one command loop, one serialized
//! tool runner per host.

pub mod checkin;
pub mod control;
pub mod executor;
pub mod toolrunner;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use crate::client::GarrisonClient;
use crate::config::AgentConfig;
use crate::server::shutdown_signal;

use checkin::CheckinLoop;
use control::ProcessServerControl;
use executor::{CommandExecutor, RemoteWorkSource};

pub async fn run(config: AgentConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let host_name = match &config.host_name {
        Some(name) => name.clone(),
        None => hostname::get()
            .context("reading machine hostname")?
            .to_string_lossy()
            .into_owned(),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host_name, controller = %config.controller_url,
        "Garrison agent starting"
    );

    let client = GarrisonClient::new(&config.controller_url)?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Nothing to do until the controller knows this host.
    let registration = tokio::select! {
        r = checkin::wait_for_registration(
            &client,
            &host_name,
            config.unregistered_backoff_secs,
            config.unreachable_backoff_secs,
            &mut shutdown_rx,
        ) => r,
        _ = shutdown_signal() => None,
    };
    let Some(registration) = registration else {
        info!("Garrison agent stopped before registration");
        return Ok(());
    };

    let control = Arc::new(ProcessServerControl::new());

    // Serialized tool queue and the task that resolves deferred work items.
    let (tools, runner, done_rx) = toolrunner::channel();
    tokio::spawn(runner.run(shutdown_rx.clone()));
    tokio::spawn(executor::run_completion_loop(
        RemoteWorkSource::new(client.clone()),
        done_rx,
    ));

    let checkin = CheckinLoop::new(
        client.clone(),
        control.clone(),
        host_name,
        registration.external_addr,
        config.checkin_interval_secs,
        config.unregistered_backoff_secs,
        config.unreachable_backoff_secs,
    );
    let checkin_task = tokio::spawn(checkin.run(registration.servers, shutdown_rx.clone()));

    let executor = CommandExecutor::new(
        RemoteWorkSource::new(client),
        control,
        tools,
        registration.host_id,
        config.update_tool.clone(),
        config.poll_interval_secs,
        config.spinup_wait_secs,
    );
    let executor_task = tokio::spawn(executor.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    let _ = checkin_task.await;
    let _ = executor_task.await;

    info!("Garrison agent stopped");
    Ok(())
}
