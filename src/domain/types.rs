//! Fleet model — hosts, game servers, profiles, and the connectivity
//! lifecycle every observed server moves through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::configset::{ConfigFormat, ConfigItem};

/// Where a game server (or host) currently is in its lifecycle, as judged
/// from observation. Mutated only through the fleet registry's update path,
/// which stamps `last_state_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Unknown,
    UnRegistered,
    Unreachable,
    SpinningUp,
    Installing,
    Updating,
    Restarting,
    Uninstalling,
    ShuttingDown,
    Discovering,
    Stalled,
    InternallyConnectable,
    Connectable,
    Shutdown,
    Uninstalled,
    OverlappingPort,
}

impl ConnectivityState {
    /// True for active transitional states only — the "mid-operation" check
    /// the agent's backpressure gate consults.
    pub fn is_doing_something(self) -> bool {
        matches!(
            self,
            Self::SpinningUp
                | Self::Installing
                | Self::Updating
                | Self::Restarting
                | Self::Uninstalling
                | Self::ShuttingDown
                | Self::Discovering
        )
    }

    /// True while the server is doing something or is reachable; false for
    /// terminal/absent states.
    pub fn is_running(self) -> bool {
        self.is_doing_something()
            || matches!(self, Self::InternallyConnectable | Self::Connectable)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A remote machine running the garrison agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: u64,
    pub name: String,
    pub address: String,
    pub state: ConnectivityState,
    pub last_state_update: DateTime<Utc>,
    pub agent_version: Option<String>,
    pub last_checkin: Option<DateTime<Utc>>,
}

/// A managed game server instance on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameServer {
    pub id: u64,
    pub host_id: u64,
    pub profile_id: u64,
    pub name: String,
    pub install_dir: String,
    pub query_port: u16,
    pub state: ConnectivityState,
    pub last_state_update: DateTime<Utc>,
    /// Instance-level resource overrides, merged over the profile's set.
    #[serde(default)]
    pub resources: Vec<LocalResource>,
}

/// Reachability facts an agent reports for one of its servers at check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerObservation {
    pub server_id: u64,
    pub process_running: bool,
    pub internally_reachable: bool,
    pub externally_reachable: bool,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

/// What a deployable artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Executable,
    ConfigFile,
}

/// A deployable artifact owned by a profile (template) or a server
/// (instance override): an executable to launch or a config file to
/// regenerate, with its ordered configuration items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalResource {
    pub id: u64,
    pub name: String,
    pub kind: ResourceKind,
    /// Codec for config files; irrelevant for executables.
    pub content_type: Option<ConfigFormat>,
    /// Path relative to the server's install dir.
    pub path: String,
    /// Launch this resource when the server starts.
    pub startup: bool,
    pub startup_priority: i32,
    #[serde(default)]
    pub config_items: Vec<ConfigItem>,
}

/// A template a game server is instantiated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProfile {
    pub id: u64,
    pub name: String,
    /// External update-tool application id (steamcmd-style).
    pub app_id: Option<String>,
    #[serde(default)]
    pub resources: Vec<LocalResource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitional_states_are_running_but_reachable_is_not_transitional() {
        assert!(ConnectivityState::Installing.is_doing_something());
        assert!(ConnectivityState::Installing.is_running());
        assert!(ConnectivityState::Connectable.is_running());
        assert!(!ConnectivityState::Connectable.is_doing_something());
    }

    #[test]
    fn terminal_and_absent_states_are_not_running() {
        for state in [
            ConnectivityState::Unknown,
            ConnectivityState::UnRegistered,
            ConnectivityState::Unreachable,
            ConnectivityState::Stalled,
            ConnectivityState::Shutdown,
            ConnectivityState::Uninstalled,
            ConnectivityState::OverlappingPort,
        ] {
            assert!(!state.is_running(), "{state} should not count as running");
        }
    }
}
