//! Work items — the typed jobs the control plane hands to host agents.
//!
//! `TargetType` is an ordered enumeration with contiguous bands: host
//! commands, game-server commands, and a `CurrentEnd` sentinel used only
//! for range comparison. The band of an item is derived exactly once, at
//! construction; nothing else in the codebase compares target-type order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::configset::{ConfigFormat, ConfigItem};

/// The command a work item carries, in routing order. Numeric gaps leave
/// room for new commands inside each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum TargetType {
    // Host band
    RestartHost = 0,
    UpdateHost = 1,
    ReconfigureHost = 2,

    // Game-server band
    RestartGameServer = 100,
    StartGameServer = 101,
    StopGameServer = 102,
    UpdateGameServer = 103,
    ReconfigureGameServer = 104,
    CreateGameServer = 105,
    DeleteGameServer = 106,
    GameServerStateUpdate = 107,

    /// Range sentinel, never assigned to a work item.
    #[value(skip)]
    CurrentEnd = 200,
}

impl TargetType {
    /// The only place target-type ordering is compared.
    pub fn band(self) -> TargetBand {
        let code = self as i32;
        if code >= Self::RestartHost as i32 && code < Self::RestartGameServer as i32 {
            TargetBand::Host
        } else {
            debug_assert!(code < Self::CurrentEnd as i32);
            TargetBand::GameServer
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Two-valued routing tag derived from `TargetType` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TargetBand {
    Host,
    GameServer,
}

impl std::fmt::Display for TargetBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::GameServer => f.write_str("game_server"),
        }
    }
}

/// Work item lifecycle. Transitions are monotonic and terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    WaitingToBePickedUp,
    PickedUp,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::WaitingToBePickedUp => 0,
            Self::PickedUp => 1,
            Self::InProgress => 2,
            Self::Completed | Self::Cancelled | Self::Failed => 3,
        }
    }

    /// Forward-only: a status may move to a strictly later rank, never
    /// sideways, backwards, or out of a terminal state.
    pub fn can_transition_to(self, next: WorkStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A unit of work for one host (and optionally one of its game servers).
/// `work_data` is opaque to the queue and immutable once enqueued; only
/// `status`/`updated_at` change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    pub host_id: u64,
    pub game_server_id: Option<u64>,
    pub target_type: TargetType,
    pub band: TargetBand,
    pub status: WorkStatus,
    pub work_data: serde_json::Value,
    /// SHA-256 of the serialized payload: "sha256:<hex>".
    pub checksum: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(
        id: u64,
        host_id: u64,
        game_server_id: Option<u64>,
        target_type: TargetType,
        work_data: serde_json::Value,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            host_id,
            game_server_id,
            target_type,
            band: target_type.band(),
            status: WorkStatus::WaitingToBePickedUp,
            checksum: payload_checksum(&work_data),
            work_data,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Decode the opaque payload into the typed command vocabulary.
    pub fn payload(&self) -> Result<WorkPayload, serde_json::Error> {
        serde_json::from_value(self.work_data.clone())
    }

    /// Verify the payload was not altered since enqueue.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == payload_checksum(&self.work_data)
    }
}

fn payload_checksum(data: &serde_json::Value) -> String {
    let serialized = data.to_string();
    format!("sha256:{:x}", Sha256::digest(serialized.as_bytes()))
}

/// One config file an agent should regenerate through the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFileTarget {
    /// Path relative to the install dir (game-server work) or absolute
    /// (host work).
    pub path: String,
    pub format: ConfigFormat,
    pub items: Vec<ConfigItem>,
}

/// Typed payload vocabulary the dispatcher serializes into `work_data`.
/// The queue never interprets this; agents decode it at dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkPayload {
    RestartHost,
    UpdateHost { packages: Vec<String> },
    ReconfigureHost { files: Vec<ConfigFileTarget> },
    RestartGameServer,
    StartGameServer,
    StopGameServer,
    UpdateGameServer { app_id: String, validate: bool },
    ReconfigureGameServer { files: Vec<ConfigFileTarget> },
    CreateGameServer { app_id: String, install_dir: String },
    DeleteGameServer { remove_files: bool },
    GameServerStateUpdate,
}

impl WorkPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The target type this command must be routed under. Dispatch rejects
    /// an item whose routing field disagrees with its decoded payload, so
    /// band isolation stays command isolation.
    pub fn target_type(&self) -> TargetType {
        match self {
            Self::RestartHost => TargetType::RestartHost,
            Self::UpdateHost { .. } => TargetType::UpdateHost,
            Self::ReconfigureHost { .. } => TargetType::ReconfigureHost,
            Self::RestartGameServer => TargetType::RestartGameServer,
            Self::StartGameServer => TargetType::StartGameServer,
            Self::StopGameServer => TargetType::StopGameServer,
            Self::UpdateGameServer { .. } => TargetType::UpdateGameServer,
            Self::ReconfigureGameServer { .. } => TargetType::ReconfigureGameServer,
            Self::CreateGameServer { .. } => TargetType::CreateGameServer,
            Self::DeleteGameServer { .. } => TargetType::DeleteGameServer,
            Self::GameServerStateUpdate => TargetType::GameServerStateUpdate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_derived_from_target_type_ranges() {
        assert_eq!(TargetType::RestartHost.band(), TargetBand::Host);
        assert_eq!(TargetType::ReconfigureHost.band(), TargetBand::Host);
        assert_eq!(TargetType::RestartGameServer.band(), TargetBand::GameServer);
        assert_eq!(
            TargetType::GameServerStateUpdate.band(),
            TargetBand::GameServer
        );
    }

    #[test]
    fn status_moves_forward_only() {
        use WorkStatus::*;
        assert!(WaitingToBePickedUp.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        // Administrative cancel directly from the queue.
        assert!(WaitingToBePickedUp.can_transition_to(Cancelled));

        assert!(!InProgress.can_transition_to(PickedUp));
        assert!(!PickedUp.can_transition_to(PickedUp));
        for terminal in [Completed, Cancelled, Failed] {
            assert!(!terminal.can_transition_to(InProgress));
            assert!(!terminal.can_transition_to(Completed));
        }
    }

    #[test]
    fn new_items_start_waiting_with_a_payload_checksum() {
        let payload = WorkPayload::StopGameServer.to_value();
        let item = WorkItem::new(1, 10, Some(7), TargetType::StopGameServer, payload, "test");
        assert_eq!(item.status, WorkStatus::WaitingToBePickedUp);
        assert_eq!(item.band, TargetBand::GameServer);
        assert!(item.verify_checksum());
    }

    #[test]
    fn payload_round_trips_through_work_data() {
        let payload = WorkPayload::UpdateGameServer {
            app_id: "376030".into(),
            validate: true,
        };
        let item = WorkItem::new(
            2,
            10,
            Some(7),
            TargetType::UpdateGameServer,
            payload.to_value(),
            "test",
        );
        match item.payload().unwrap() {
            WorkPayload::UpdateGameServer { app_id, validate } => {
                assert_eq!(app_id, "376030");
                assert!(validate);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
