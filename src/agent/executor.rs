//! The host agent's command loop.
//!
//! One logical worker per host: pull at most one work item, execute it to
//! completion, then pull the next. Before executing, the loop asks whether
//! the target is waiting on something else — a server mid-transition sets
//! the item aside for a later pass instead of failing it. Dispatch goes by
//! command kind to exactly one handler; an unknown or undecodable command
//! fails the item rather than silently dropping it.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::GarrisonClient;
use crate::domain::types::{ConnectivityState, GameServer, LocalResource};
use crate::domain::work::{TargetBand, WorkItem, WorkPayload, WorkStatus};

use super::control::ServerControl;
use super::toolrunner::{ToolCompletion, ToolInvocation, ToolRunnerHandle};

/// Where the agent pulls work from and reports results to. Production uses
/// the controller's REST API; tests drive the loop against the in-process
/// queue and registry.
pub trait WorkSource: Send + Sync {
    fn next_work(
        &self,
        host_id: u64,
        band: TargetBand,
    ) -> impl std::future::Future<Output = Result<Option<WorkItem>>> + Send;

    fn update_status(
        &self,
        id: u64,
        status: WorkStatus,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn report_server_state(
        &self,
        id: u64,
        state: ConnectivityState,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn server(&self, id: u64) -> impl std::future::Future<Output = Result<GameServer>> + Send;

    fn resolved_resources(
        &self,
        id: u64,
    ) -> impl std::future::Future<Output = Result<Vec<LocalResource>>> + Send;
}

/// REST-backed work source.
pub struct RemoteWorkSource {
    client: GarrisonClient,
}

impl RemoteWorkSource {
    pub fn new(client: GarrisonClient) -> Self {
        Self { client }
    }
}

impl WorkSource for RemoteWorkSource {
    async fn next_work(&self, host_id: u64, band: TargetBand) -> Result<Option<WorkItem>> {
        self.client.next_work_for_host(host_id, band).await
    }
    async fn update_status(&self, id: u64, status: WorkStatus) -> Result<()> {
        self.client.update_work_status(id, status).await.map(|_| ())
    }
    async fn report_server_state(&self, id: u64, state: ConnectivityState) -> Result<()> {
        self.client.report_server_state(id, state).await.map(|_| ())
    }
    async fn server(&self, id: u64) -> Result<GameServer> {
        self.client.server(id).await
    }
    async fn resolved_resources(&self, id: u64) -> Result<Vec<LocalResource>> {
        self.client.server_resources(id).await
    }
}

/// What one pass over the queue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// An item ran to a terminal status (or was handed to the tool queue).
    Executed,
    /// An item exists but its target is busy; retry on a later pass.
    SetAside,
    /// Nothing waiting.
    Empty,
}

/// How a dispatched handler left the work item.
enum Outcome {
    /// Handler finished; resolve the item Completed.
    Done,
    /// Handed to the serialized tool queue; the completion loop resolves
    /// the item later. It stays InProgress meanwhile.
    Deferred,
}

pub struct CommandExecutor<S: WorkSource, C: ServerControl> {
    source: S,
    control: C,
    tools: ToolRunnerHandle,
    host_id: u64,
    update_tool: String,
    poll_interval: Duration,
    spinup_wait: Duration,
}

impl<S: WorkSource, C: ServerControl> CommandExecutor<S, C> {
    pub fn new(
        source: S,
        control: C,
        tools: ToolRunnerHandle,
        host_id: u64,
        update_tool: String,
        poll_interval_secs: u64,
        spinup_wait_secs: u64,
    ) -> Self {
        Self {
            source,
            control,
            tools,
            host_id,
            update_tool,
            poll_interval: Duration::from_secs(poll_interval_secs),
            spinup_wait: Duration::from_secs(spinup_wait_secs),
        }
    }

    /// Single-flight loop: drain executable items back to back, sleep only
    /// when the queue is empty or everything waiting is set aside.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(host_id = self.host_id, "command loop started");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    while self.step().await == Step::Executed {}
                }
                _ = shutdown.changed() => {
                    info!("command loop stopping");
                    break;
                }
            }
        }
    }

    /// Process at most one work item. Host-directed work takes precedence
    /// over game-server work within a pass.
    pub async fn step(&self) -> Step {
        for band in [TargetBand::Host, TargetBand::GameServer] {
            let item = match self.source.next_work(self.host_id, band).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "work pull failed");
                    return Step::Empty;
                }
            };

            if self.is_waiting_on_something_else(&item).await {
                debug!(work_id = item.id, "target busy, setting work aside");
                return Step::SetAside;
            }
            return self.execute(item).await;
        }
        Step::Empty
    }

    /// Backpressure gate: a game server mid-transition makes its items
    /// wait, and so does a target the agent cannot currently verify.
    async fn is_waiting_on_something_else(&self, item: &WorkItem) -> bool {
        let Some(server_id) = item.game_server_id else {
            return false;
        };
        match self.source.server(server_id).await {
            Ok(server) => server.state.is_doing_something(),
            Err(e) => {
                warn!(work_id = item.id, server_id, error = %e, "target lookup failed");
                true
            }
        }
    }

    async fn execute(&self, item: WorkItem) -> Step {
        // An administrative cancel between pull and pickup surfaces as an
        // invalid transition here and the next pull skips the item; a
        // transient report failure leaves it waiting. Either way, stop
        // draining and let the next tick retry instead of re-pulling
        // immediately.
        if let Err(e) = self.source.update_status(item.id, WorkStatus::PickedUp).await {
            warn!(work_id = item.id, error = %e, "could not pick up item, waiting for next pass");
            return Step::Empty;
        }
        if let Err(e) = self
            .source
            .update_status(item.id, WorkStatus::InProgress)
            .await
        {
            warn!(work_id = item.id, error = %e, "could not start item, waiting for next pass");
            return Step::Empty;
        }

        info!(
            work_id = item.id,
            target_type = %item.target_type,
            game_server_id = item.game_server_id,
            "executing work item"
        );

        match self.dispatch(&item).await {
            Ok(Outcome::Done) => {
                if let Err(e) = self.source.update_status(item.id, WorkStatus::Completed).await {
                    warn!(work_id = item.id, error = %e, "could not complete item");
                }
            }
            Ok(Outcome::Deferred) => {
                debug!(work_id = item.id, "handed to tool queue");
            }
            Err(e) => {
                // Failure resolves the item and leaves observed state alone.
                warn!(work_id = item.id, error = %e, "work item failed");
                if let Err(e) = self.source.update_status(item.id, WorkStatus::Failed).await {
                    warn!(work_id = item.id, error = %e, "could not fail item");
                }
            }
        }
        Step::Executed
    }

    async fn dispatch(&self, item: &WorkItem) -> Result<Outcome> {
        if !item.verify_checksum() {
            bail!("payload checksum mismatch");
        }
        let payload = item
            .payload()
            .context("unknown command: payload does not decode")?;
        if payload.target_type() != item.target_type {
            bail!(
                "payload command {} does not match target type {}",
                payload.target_type(),
                item.target_type
            );
        }

        match payload {
            WorkPayload::RestartHost => {
                self.control.restart_host().await?;
                Ok(Outcome::Done)
            }
            WorkPayload::UpdateHost { packages } => {
                self.control.update_host_packages(&packages).await?;
                Ok(Outcome::Done)
            }
            WorkPayload::ReconfigureHost { files } => {
                self.control.apply_config_files(Path::new("/"), &files).await?;
                Ok(Outcome::Done)
            }
            WorkPayload::RestartGameServer => {
                let server = self.target_server(item).await?;
                self.report_state(server.id, ConnectivityState::Restarting).await;
                self.control.stop(&server).await?;
                let resources = self.source.resolved_resources(server.id).await?;
                self.control.start(&server, &resources).await?;
                // Bounded wait for first-run initialization before the
                // watcher takes over.
                tokio::time::sleep(self.spinup_wait).await;
                self.report_state(server.id, ConnectivityState::SpinningUp).await;
                Ok(Outcome::Done)
            }
            WorkPayload::StartGameServer => {
                let server = self.target_server(item).await?;
                let resources = self.source.resolved_resources(server.id).await?;
                self.control.start(&server, &resources).await?;
                self.report_state(server.id, ConnectivityState::SpinningUp).await;
                Ok(Outcome::Done)
            }
            WorkPayload::StopGameServer => {
                let server = self.target_server(item).await?;
                self.report_state(server.id, ConnectivityState::ShuttingDown).await;
                self.control.stop(&server).await?;
                self.report_state(server.id, ConnectivityState::Shutdown).await;
                Ok(Outcome::Done)
            }
            WorkPayload::UpdateGameServer { app_id, validate } => {
                let server = self.target_server(item).await?;
                self.report_state(server.id, ConnectivityState::Updating).await;
                self.tools.enqueue(ToolInvocation {
                    work_id: item.id,
                    server_id: server.id,
                    tool: self.update_tool.clone(),
                    args: update_tool_args(&server.install_dir, &app_id, validate),
                });
                Ok(Outcome::Deferred)
            }
            WorkPayload::ReconfigureGameServer { files } => {
                let server = self.target_server(item).await?;
                self.control
                    .apply_config_files(Path::new(&server.install_dir), &files)
                    .await?;
                Ok(Outcome::Done)
            }
            WorkPayload::CreateGameServer { app_id, install_dir } => {
                let server = self.target_server(item).await?;
                self.report_state(server.id, ConnectivityState::Installing).await;
                self.tools.enqueue(ToolInvocation {
                    work_id: item.id,
                    server_id: server.id,
                    tool: self.update_tool.clone(),
                    args: update_tool_args(&install_dir, &app_id, true),
                });
                Ok(Outcome::Deferred)
            }
            WorkPayload::DeleteGameServer { remove_files } => {
                let server = self.target_server(item).await?;
                self.report_state(server.id, ConnectivityState::Uninstalling).await;
                self.control.stop(&server).await?;
                if remove_files {
                    self.control.remove_install(&server).await?;
                }
                self.report_state(server.id, ConnectivityState::Uninstalled).await;
                Ok(Outcome::Done)
            }
            WorkPayload::GameServerStateUpdate => {
                let server = self.target_server(item).await?;
                let obs = self.control.observe(&server, None).await;
                let state = if obs.process_running {
                    ConnectivityState::InternallyConnectable
                } else {
                    ConnectivityState::Shutdown
                };
                self.report_state(server.id, state).await;
                Ok(Outcome::Done)
            }
        }
    }

    async fn target_server(&self, item: &WorkItem) -> Result<GameServer> {
        let id = item
            .game_server_id
            .context("game-server command without a game server id")?;
        self.source.server(id).await
    }

    /// State reports are best-effort: a failed report must not fail work
    /// that already had its side effects.
    async fn report_state(&self, server_id: u64, state: ConnectivityState) {
        if let Err(e) = self.source.report_server_state(server_id, state).await {
            warn!(server_id, state = %state, error = %e, "state report failed");
        }
    }
}

fn update_tool_args(install_dir: &str, app_id: &str, validate: bool) -> Vec<String> {
    let mut args = vec![
        "+force_install_dir".to_string(),
        install_dir.to_string(),
        "+login".to_string(),
        "anonymous".to_string(),
        "+app_update".to_string(),
        app_id.to_string(),
    ];
    if validate {
        args.push("validate".to_string());
    }
    args.push("+quit".to_string());
    args
}

/// Resolve deferred items as tool invocations finish: success completes the
/// item and settles the server at Shutdown (installed, not started);
/// failure fails the item and leaves observed state unchanged.
pub async fn run_completion_loop<S: WorkSource>(
    source: S,
    mut done_rx: mpsc::UnboundedReceiver<ToolCompletion>,
) {
    while let Some(completion) = done_rx.recv().await {
        if completion.success {
            if let Err(e) = source
                .update_status(completion.work_id, WorkStatus::Completed)
                .await
            {
                warn!(work_id = completion.work_id, error = %e, "could not complete item");
            }
            if let Err(e) = source
                .report_server_state(completion.server_id, ConnectivityState::Shutdown)
                .await
            {
                warn!(server_id = completion.server_id, error = %e, "state report failed");
            }
        } else {
            warn!(
                work_id = completion.work_id,
                detail = %completion.detail,
                "tool invocation failed"
            );
            if let Err(e) = source
                .update_status(completion.work_id, WorkStatus::Failed)
                .await
            {
                warn!(work_id = completion.work_id, error = %e, "could not fail item");
            }
        }
    }
}
