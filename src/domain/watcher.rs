//! Lifecycle watcher — reconciles observed reachability into connectivity
//! state, once per tick, per game server.
//!
//! The transition policy is a pure function so every branch is testable
//! with a pinned clock; the loop only applies verdicts through the
//! registry's update path. The watcher never enqueues work — its output is
//! the gate the agent's backpressure check consults.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use super::fleet::FleetRegistry;
use super::types::{ConnectivityState, ServerObservation};

/// Grace window for long-running transitional states before the watcher
/// gives up and declares the state unexplained.
pub const TRANSITION_GRACE_SECS: i64 = 600;

/// A heartbeat older than this, with the process still up, counts as hung.
const HEARTBEAT_TIMEOUT_SECS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Current state still explains the observation.
    Hold,
    Move(ConnectivityState),
    /// The watcher cannot explain what it sees: degrade to Unknown and
    /// surface a warning for the operator.
    Unexplained,
}

/// Stalled means the process is gone from a server we knew to be up, or the
/// process is up but its heartbeat hung.
fn judged_stalled(
    state: ConnectivityState,
    obs: &ServerObservation,
    now: DateTime<Utc>,
) -> bool {
    let known_running = matches!(
        state,
        ConnectivityState::Connectable | ConnectivityState::InternallyConnectable
    );
    if !obs.process_running && known_running {
        return true;
    }
    if obs.process_running {
        if let Some(beat) = obs.heartbeat_at {
            return (now - beat).num_seconds() > HEARTBEAT_TIMEOUT_SECS;
        }
    }
    false
}

/// One watcher tick for one server.
pub fn evaluate(
    state: ConnectivityState,
    last_state_update: DateTime<Utc>,
    obs: &ServerObservation,
    now: DateTime<Utc>,
) -> Verdict {
    if judged_stalled(state, obs, now) {
        return if state == ConnectivityState::Stalled {
            Verdict::Hold
        } else {
            Verdict::Move(ConnectivityState::Stalled)
        };
    }

    if obs.externally_reachable {
        return if state == ConnectivityState::Connectable {
            Verdict::Hold
        } else {
            Verdict::Move(ConnectivityState::Connectable)
        };
    }

    if !state.is_running() {
        // Shutdown is the stable not-running state; Uninstalled stays put
        // rather than resurrecting as Shutdown.
        return if matches!(
            state,
            ConnectivityState::Shutdown | ConnectivityState::Uninstalled
        ) {
            Verdict::Hold
        } else {
            Verdict::Move(ConnectivityState::Shutdown)
        };
    }

    if obs.internally_reachable {
        return if state == ConnectivityState::InternallyConnectable {
            Verdict::Hold
        } else {
            Verdict::Move(ConnectivityState::InternallyConnectable)
        };
    }

    let transitional = matches!(
        state,
        ConnectivityState::Installing
            | ConnectivityState::Updating
            | ConnectivityState::Restarting
            | ConnectivityState::SpinningUp
    );
    if transitional && (now - last_state_update).num_seconds() < TRANSITION_GRACE_SECS {
        return Verdict::Hold;
    }

    Verdict::Unexplained
}

pub struct Watcher {
    fleet: Arc<FleetRegistry>,
    tick: Duration,
    /// A host silent longer than this is marked Unreachable.
    host_silence: chrono::Duration,
}

impl Watcher {
    pub fn new(fleet: Arc<FleetRegistry>, tick_secs: u64, host_silence_secs: u64) -> Self {
        Self {
            fleet,
            tick: Duration::from_secs(tick_secs),
            host_silence: chrono::Duration::seconds(host_silence_secs as i64),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        info!(tick_secs = self.tick.as_secs(), "lifecycle watcher started");
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_once().await,
                _ = shutdown.changed() => {
                    info!("lifecycle watcher stopping");
                    break;
                }
            }
        }
    }

    pub async fn tick_once(&self) {
        let now = Utc::now();

        for server in self.fleet.list_servers().await {
            let Some(obs) = self.fleet.latest_observation(server.id).await else {
                continue;
            };
            match evaluate(server.state, server.last_state_update, &obs, now) {
                Verdict::Hold => {}
                Verdict::Move(next) => {
                    if let Err(e) = self.fleet.update_server_state(server.id, next).await {
                        warn!(server_id = server.id, error = %e, "state update failed");
                    }
                }
                Verdict::Unexplained => {
                    warn!(
                        server_id = server.id,
                        state = %server.state,
                        process_running = obs.process_running,
                        "cannot explain server state, degrading to Unknown"
                    );
                    if let Err(e) = self
                        .fleet
                        .update_server_state(server.id, ConnectivityState::Unknown)
                        .await
                    {
                        warn!(server_id = server.id, error = %e, "state update failed");
                    }
                }
            }
        }

        for host in self.fleet.list_hosts().await {
            let silent = match host.last_checkin {
                Some(at) => now - at > self.host_silence,
                None => false,
            };
            if silent && host.state == ConnectivityState::Connectable {
                warn!(host_id = host.id, name = %host.name, "host stopped checking in");
                if let Err(e) = self.fleet.mark_host_unreachable(host.id).await {
                    warn!(host_id = host.id, error = %e, "host update failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::Notifier;

    fn obs(process: bool, internal: bool, external: bool) -> ServerObservation {
        ServerObservation {
            server_id: 1,
            process_running: process,
            internally_reachable: internal,
            externally_reachable: external,
            heartbeat_at: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn installing_within_grace_is_held() {
        let now = Utc::now();
        let five_min_ago = now - chrono::Duration::minutes(5);
        let verdict = evaluate(
            ConnectivityState::Installing,
            five_min_ago,
            &obs(false, false, false),
            now,
        );
        assert_eq!(verdict, Verdict::Hold);
    }

    #[test]
    fn installing_past_grace_is_unexplained() {
        let now = Utc::now();
        let fifteen_min_ago = now - chrono::Duration::minutes(15);
        let verdict = evaluate(
            ConnectivityState::Installing,
            fifteen_min_ago,
            &obs(false, false, false),
            now,
        );
        assert_eq!(verdict, Verdict::Unexplained);
    }

    #[test]
    fn process_vanishing_from_a_reachable_server_is_stalled() {
        let now = Utc::now();
        let verdict = evaluate(
            ConnectivityState::Connectable,
            now,
            &obs(false, false, false),
            now,
        );
        assert_eq!(verdict, Verdict::Move(ConnectivityState::Stalled));

        // Already Stalled and still unexplainable: the stall judgment no
        // longer applies, so the not-running rule settles it to Shutdown.
        let verdict = evaluate(ConnectivityState::Stalled, now, &obs(false, false, false), now);
        assert_eq!(verdict, Verdict::Move(ConnectivityState::Shutdown));
    }

    #[test]
    fn hung_heartbeat_with_live_process_is_stalled() {
        let now = Utc::now();
        let mut o = obs(true, true, true);
        o.heartbeat_at = Some(now - chrono::Duration::minutes(5));
        let verdict = evaluate(ConnectivityState::Connectable, now, &o, now);
        assert_eq!(verdict, Verdict::Move(ConnectivityState::Stalled));
    }

    #[test]
    fn externally_reachable_promotes_and_then_holds() {
        let now = Utc::now();
        let verdict = evaluate(ConnectivityState::SpinningUp, now, &obs(true, true, true), now);
        assert_eq!(verdict, Verdict::Move(ConnectivityState::Connectable));

        let verdict = evaluate(ConnectivityState::Connectable, now, &obs(true, true, true), now);
        assert_eq!(verdict, Verdict::Hold);
    }

    #[test]
    fn internal_only_reachability_is_internally_connectable() {
        let now = Utc::now();
        let verdict = evaluate(ConnectivityState::SpinningUp, now, &obs(true, true, false), now);
        assert_eq!(verdict, Verdict::Move(ConnectivityState::InternallyConnectable));
    }

    #[test]
    fn shutdown_is_a_stable_not_running_state() {
        let now = Utc::now();
        let verdict = evaluate(ConnectivityState::Shutdown, now, &obs(false, false, false), now);
        assert_eq!(verdict, Verdict::Hold);

        let verdict = evaluate(ConnectivityState::Unknown, now, &obs(false, false, false), now);
        assert_eq!(verdict, Verdict::Move(ConnectivityState::Shutdown));
    }

    #[tokio::test]
    async fn tick_applies_verdicts_through_the_registry() {
        let fleet = Arc::new(FleetRegistry::new(Notifier::new(16)));
        let host = fleet.add_host("h1", "10.0.0.5").await;
        let profile = fleet.add_profile("ark", None, vec![]).await;
        let server = fleet
            .add_server(host.id, profile.id, "arena", "/srv/arena", 27015)
            .await
            .unwrap();
        fleet
            .update_server_state(server.id, ConnectivityState::SpinningUp)
            .await
            .unwrap();

        let mut o = obs(true, true, true);
        o.server_id = server.id;
        fleet.record_observation(o).await;

        let watcher = Watcher::new(fleet.clone(), 30, 180);
        watcher.tick_once().await;

        let server = fleet.get_server(server.id).await.unwrap();
        assert_eq!(server.state, ConnectivityState::Connectable);
    }
}
