//! Periodic host check-in against the controller.
//!
//! The check-in doubles as the host heartbeat and the observation channel:
//! every cycle the agent probes its local game servers and ships the
//! observations with the check-in request. The response carries the
//! authoritative server list for the next cycle, so topology changes made
//! on the controller reach the agent without a separate sync path.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::rest::CheckinRequest;
use crate::client::GarrisonClient;
use crate::domain::types::{GameServer, ServerObservation};

use super::control::ServerControl;

/// Outcome of the registration wait at agent startup.
pub struct Registration {
    pub host_id: u64,
    /// Host address as the controller sees it, used for external reachability
    /// probes. Absent when the host record carries no address.
    pub external_addr: Option<String>,
    pub servers: Vec<GameServer>,
}

pub struct CheckinLoop<C: ServerControl> {
    client: GarrisonClient,
    control: C,
    host_name: String,
    external_addr: Option<String>,
    interval: Duration,
    unregistered_backoff: Duration,
    unreachable_backoff: Duration,
}

impl<C: ServerControl> CheckinLoop<C> {
    pub fn new(
        client: GarrisonClient,
        control: C,
        host_name: String,
        external_addr: Option<String>,
        interval_secs: u64,
        unregistered_backoff_secs: u64,
        unreachable_backoff_secs: u64,
    ) -> Self {
        Self {
            client,
            control,
            host_name,
            external_addr,
            interval: Duration::from_secs(interval_secs),
            unregistered_backoff: Duration::from_secs(unregistered_backoff_secs),
            unreachable_backoff: Duration::from_secs(unreachable_backoff_secs),
        }
    }

    /// Steady-state loop. Keeps its own copy of the server list, refreshed
    /// from every successful response.
    pub async fn run(self, mut servers: Vec<GameServer>, mut shutdown: watch::Receiver<bool>) {
        let mut consecutive_failures: u32 = 0;
        loop {
            let observations = self.observe_all(&servers).await;
            let request = CheckinRequest {
                host_name: self.host_name.clone(),
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                observations,
            };

            let wait = match self.client.checkin(&request).await {
                Ok(response) => {
                    consecutive_failures = 0;
                    if response.registered {
                        debug!(servers = response.servers.len(), "checked in");
                        servers = response.servers;
                        self.interval
                    } else {
                        // The host was deregistered out from under us; keep
                        // heartbeating so re-registration is picked up.
                        warn!(host_name = %self.host_name, "host no longer registered");
                        servers.clear();
                        self.unregistered_backoff
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        error = %e,
                        consecutive_failures,
                        "check-in failed, controller unreachable"
                    );
                    self.unreachable_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("check-in loop stopping");
                    break;
                }
            }
        }
    }

    async fn observe_all(&self, servers: &[GameServer]) -> Vec<ServerObservation> {
        let mut observations = Vec::with_capacity(servers.len());
        for server in servers {
            observations.push(
                self.control
                    .observe(server, self.external_addr.as_deref())
                    .await,
            );
        }
        observations
    }
}

/// Check in until the controller recognizes this host. A host that is not
/// registered yet polls on a short backoff so that registration on the
/// controller takes effect quickly. Returns None on shutdown.
pub async fn wait_for_registration(
    client: &GarrisonClient,
    host_name: &str,
    unregistered_backoff_secs: u64,
    unreachable_backoff_secs: u64,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Registration> {
    loop {
        let request = CheckinRequest {
            host_name: host_name.to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            observations: Vec::new(),
        };
        let wait = match client.checkin(&request).await {
            Ok(response) if response.registered => {
                let host_id = match response.host_id {
                    Some(id) => id,
                    None => {
                        warn!("controller accepted check-in without a host id");
                        tokio::time::sleep(Duration::from_secs(unreachable_backoff_secs)).await;
                        continue;
                    }
                };
                info!(host_id, host_name, "host registered with controller");
                let external_addr = lookup_address(client, host_name).await;
                return Some(Registration {
                    host_id,
                    external_addr,
                    servers: response.servers,
                });
            }
            Ok(_) => {
                warn!(host_name, "host not registered with controller yet");
                Duration::from_secs(unregistered_backoff_secs)
            }
            Err(e) => {
                warn!(error = %e, "controller unreachable");
                Duration::from_secs(unreachable_backoff_secs)
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return None,
        }
    }
}

/// Best-effort lookup of this host's registered address for external probes.
async fn lookup_address(client: &GarrisonClient, host_name: &str) -> Option<String> {
    match client.hosts().await {
        Ok(hosts) => hosts
            .into_iter()
            .find(|h| h.name == host_name)
            .map(|h| h.address),
        Err(e) => {
            debug!(error = %e, "host address lookup failed");
            None
        }
    }
}
