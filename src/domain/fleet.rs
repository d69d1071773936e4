//! Fleet registry — the control plane's authoritative record of hosts,
//! game servers, and profiles, plus the latest observation per server.
//!
//! Observed state is never written directly: every connectivity change goes
//! through `update_server_state`, which stamps `last_state_update` and
//! publishes a notification.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::configset::item::merge;

use super::events::{FleetEvent, Notifier};
use super::types::{
    ConnectivityState, GameProfile, GameServer, Host, LocalResource, ServerObservation,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("host {0} not found")]
    HostNotFound(u64),
    #[error("game server {0} not found")]
    ServerNotFound(u64),
    #[error("profile {0} not found")]
    ProfileNotFound(u64),
}

pub struct FleetRegistry {
    hosts: RwLock<HashMap<u64, Host>>,
    servers: RwLock<HashMap<u64, GameServer>>,
    profiles: RwLock<HashMap<u64, GameProfile>>,
    observations: RwLock<HashMap<u64, ServerObservation>>,
    next_id: RwLock<u64>,
    notifier: Notifier,
}

impl FleetRegistry {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            servers: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            observations: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
            notifier,
        }
    }

    async fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.write().await;
        let id = *next;
        *next += 1;
        id
    }

    // ── Hosts ──────────────────────────────────────────────

    pub async fn add_host(&self, name: &str, address: &str) -> Host {
        let host = Host {
            id: self.allocate_id().await,
            name: name.to_string(),
            address: address.to_string(),
            state: ConnectivityState::UnRegistered,
            last_state_update: Utc::now(),
            agent_version: None,
            last_checkin: None,
        };
        self.hosts.write().await.insert(host.id, host.clone());
        info!(host_id = host.id, name = %host.name, "host registered");
        host
    }

    pub async fn get_host(&self, id: u64) -> Option<Host> {
        self.hosts.read().await.get(&id).cloned()
    }

    pub async fn get_host_by_name(&self, name: &str) -> Option<Host> {
        self.hosts
            .read()
            .await
            .values()
            .find(|h| h.name == name)
            .cloned()
    }

    pub async fn list_hosts(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self.hosts.read().await.values().cloned().collect();
        hosts.sort_by_key(|h| h.id);
        hosts
    }

    /// An agent announcing itself. Unknown host names are rejected — hosts
    /// are desired state and must be created by an operator first.
    pub async fn check_in(
        &self,
        host_name: &str,
        agent_version: &str,
        observations: Vec<ServerObservation>,
    ) -> Option<(Host, Vec<GameServer>)> {
        let host = {
            let mut hosts = self.hosts.write().await;
            let host = hosts.values_mut().find(|h| h.name == host_name)?;
            host.agent_version = Some(agent_version.to_string());
            host.last_checkin = Some(Utc::now());
            if host.state != ConnectivityState::Connectable {
                host.state = ConnectivityState::Connectable;
                host.last_state_update = Utc::now();
            }
            host.clone()
        };

        for obs in observations {
            self.record_observation(obs).await;
        }

        self.notifier
            .publish(FleetEvent::HostCheckedIn { host_id: host.id });
        let servers = self.servers_for_host(host.id).await;
        Some((host, servers))
    }

    /// The watcher's verdict for a host that stopped checking in.
    pub async fn mark_host_unreachable(&self, id: u64) -> Result<(), RegistryError> {
        let mut hosts = self.hosts.write().await;
        let host = hosts.get_mut(&id).ok_or(RegistryError::HostNotFound(id))?;
        if host.state != ConnectivityState::Unreachable {
            host.state = ConnectivityState::Unreachable;
            host.last_state_update = Utc::now();
        }
        Ok(())
    }

    // ── Profiles ───────────────────────────────────────────

    pub async fn add_profile(
        &self,
        name: &str,
        app_id: Option<String>,
        resources: Vec<LocalResource>,
    ) -> GameProfile {
        let profile = GameProfile {
            id: self.allocate_id().await,
            name: name.to_string(),
            app_id,
            resources,
        };
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        profile
    }

    pub async fn get_profile(&self, id: u64) -> Option<GameProfile> {
        self.profiles.read().await.get(&id).cloned()
    }

    // ── Game servers ───────────────────────────────────────

    pub async fn add_server(
        &self,
        host_id: u64,
        profile_id: u64,
        name: &str,
        install_dir: &str,
        query_port: u16,
    ) -> Result<GameServer, RegistryError> {
        if !self.hosts.read().await.contains_key(&host_id) {
            return Err(RegistryError::HostNotFound(host_id));
        }
        if !self.profiles.read().await.contains_key(&profile_id) {
            return Err(RegistryError::ProfileNotFound(profile_id));
        }
        let server = GameServer {
            id: self.allocate_id().await,
            host_id,
            profile_id,
            name: name.to_string(),
            install_dir: install_dir.to_string(),
            query_port,
            state: ConnectivityState::Unknown,
            last_state_update: Utc::now(),
            resources: Vec::new(),
        };
        self.servers.write().await.insert(server.id, server.clone());
        info!(server_id = server.id, host_id, name = %server.name, "game server registered");
        Ok(server)
    }

    pub async fn get_server(&self, id: u64) -> Option<GameServer> {
        self.servers.read().await.get(&id).cloned()
    }

    pub async fn list_servers(&self) -> Vec<GameServer> {
        let mut servers: Vec<GameServer> = self.servers.read().await.values().cloned().collect();
        servers.sort_by_key(|s| s.id);
        servers
    }

    pub async fn servers_for_host(&self, host_id: u64) -> Vec<GameServer> {
        let mut servers: Vec<GameServer> = self
            .servers
            .read()
            .await
            .values()
            .filter(|s| s.host_id == host_id)
            .cloned()
            .collect();
        servers.sort_by_key(|s| s.id);
        servers
    }

    pub async fn set_server_resources(
        &self,
        id: u64,
        resources: Vec<LocalResource>,
    ) -> Result<(), RegistryError> {
        let mut servers = self.servers.write().await;
        let server = servers.get_mut(&id).ok_or(RegistryError::ServerNotFound(id))?;
        server.resources = resources;
        Ok(())
    }

    /// The single write path for observed connectivity. Stamps
    /// `last_state_update` and publishes the transition.
    pub async fn update_server_state(
        &self,
        id: u64,
        state: ConnectivityState,
    ) -> Result<GameServer, RegistryError> {
        let (from, updated) = {
            let mut servers = self.servers.write().await;
            let server = servers.get_mut(&id).ok_or(RegistryError::ServerNotFound(id))?;
            let from = server.state;
            server.state = state;
            server.last_state_update = Utc::now();
            (from, server.clone())
        };

        if from != state {
            info!(server_id = id, from = %from, to = %state, "connectivity changed");
            self.notifier.publish(FleetEvent::ConnectivityChanged {
                server_id: id,
                from,
                to: state,
            });
        }
        Ok(updated)
    }

    pub async fn record_observation(&self, obs: ServerObservation) {
        self.observations.write().await.insert(obs.server_id, obs);
    }

    pub async fn latest_observation(&self, server_id: u64) -> Option<ServerObservation> {
        self.observations.read().await.get(&server_id).cloned()
    }

    /// A server's effective resource set: the profile's resources with the
    /// instance overrides merged over them. Resources match by path; config
    /// items merge through the engine keeping existing ids.
    pub async fn resolved_resources(&self, server_id: u64) -> Result<Vec<LocalResource>, RegistryError> {
        let server = self
            .get_server(server_id)
            .await
            .ok_or(RegistryError::ServerNotFound(server_id))?;
        let profile = self
            .get_profile(server.profile_id)
            .await
            .ok_or(RegistryError::ProfileNotFound(server.profile_id))?;

        let mut resolved = profile.resources.clone();
        for override_res in &server.resources {
            match resolved.iter_mut().find(|r| r.path == override_res.path) {
                Some(base) => {
                    base.config_items =
                        merge(&base.config_items, &override_res.config_items, true);
                    base.startup = override_res.startup;
                    base.startup_priority = override_res.startup_priority;
                }
                None => resolved.push(override_res.clone()),
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configset::{ConfigFormat, ConfigItem};
    use crate::domain::types::ResourceKind;

    fn registry() -> FleetRegistry {
        FleetRegistry::new(Notifier::new(16))
    }

    fn config_resource(id: u64, path: &str, items: Vec<ConfigItem>) -> LocalResource {
        LocalResource {
            id,
            name: path.to_string(),
            kind: ResourceKind::ConfigFile,
            content_type: Some(ConfigFormat::Sections),
            path: path.to_string(),
            startup: false,
            startup_priority: 0,
            config_items: items,
        }
    }

    #[tokio::test]
    async fn check_in_requires_a_known_host() {
        let reg = registry();
        assert!(reg.check_in("ghost", "0.3.0", vec![]).await.is_none());

        reg.add_host("h1", "10.0.0.5").await;
        let (host, servers) = reg.check_in("h1", "0.3.0", vec![]).await.unwrap();
        assert_eq!(host.state, ConnectivityState::Connectable);
        assert_eq!(host.agent_version.as_deref(), Some("0.3.0"));
        assert!(servers.is_empty());
    }

    #[tokio::test]
    async fn update_server_state_stamps_and_notifies() {
        let reg = registry();
        let mut rx = reg.notifier.subscribe();
        let host = reg.add_host("h1", "10.0.0.5").await;
        let profile = reg.add_profile("ark", Some("376030".into()), vec![]).await;
        let server = reg
            .add_server(host.id, profile.id, "arena", "/srv/arena", 27015)
            .await
            .unwrap();

        let before = server.last_state_update;
        let updated = reg
            .update_server_state(server.id, ConnectivityState::Installing)
            .await
            .unwrap();
        assert_eq!(updated.state, ConnectivityState::Installing);
        assert!(updated.last_state_update >= before);

        // HostCheckedIn is not published here; first event is the transition.
        match rx.recv().await.unwrap() {
            FleetEvent::ConnectivityChanged { server_id, to, .. } => {
                assert_eq!(server_id, server.id);
                assert_eq!(to, ConnectivityState::Installing);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolved_resources_merge_overrides_over_profile() {
        let reg = registry();
        let host = reg.add_host("h1", "10.0.0.5").await;
        let profile_items = vec![
            ConfigItem::new("ServerSettings", "", "MaxPlayers", "20"),
            ConfigItem::new("ServerSettings", "", "ServerPassword", ""),
        ];
        let profile = reg
            .add_profile(
                "ark",
                Some("376030".into()),
                vec![config_resource(0, "Config/GameUserSettings.ini", profile_items)],
            )
            .await;
        let server = reg
            .add_server(host.id, profile.id, "arena", "/srv/arena", 27015)
            .await
            .unwrap();

        let overrides = vec![config_resource(
            0,
            "Config/GameUserSettings.ini",
            vec![ConfigItem::new("ServerSettings", "", "MaxPlayers", "70")],
        )];
        reg.set_server_resources(server.id, overrides).await.unwrap();

        let resolved = reg.resolved_resources(server.id).await.unwrap();
        assert_eq!(resolved.len(), 1);
        let items = &resolved[0].config_items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, "70");
        assert_eq!(items[1].key, "ServerPassword");
    }

    #[tokio::test]
    async fn server_creation_validates_host_and_profile() {
        let reg = registry();
        let err = reg.add_server(99, 1, "x", "/srv/x", 1).await.unwrap_err();
        assert_eq!(err, RegistryError::HostNotFound(99));

        let host = reg.add_host("h1", "10.0.0.5").await;
        let err = reg
            .add_server(host.id, 98, "x", "/srv/x", 1)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::ProfileNotFound(98));
    }
}
