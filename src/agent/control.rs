//! Local control of game-server processes and config files.
//!
//! `ServerControl` is the seam between the command loop and the machine:
//! the production impl spawns and kills real processes; tests substitute a
//! recording mock. Config regeneration always goes through the merge
//! engine so unrelated file content survives a reconfigure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::types::{GameServer, LocalResource, ResourceKind, ServerObservation};
use crate::domain::work::ConfigFileTarget;

pub trait ServerControl: Send + Sync {
    fn observe(
        &self,
        server: &GameServer,
        external_addr: Option<&str>,
    ) -> impl std::future::Future<Output = ServerObservation> + Send;

    fn start(
        &self,
        server: &GameServer,
        resources: &[LocalResource],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn stop(&self, server: &GameServer) -> impl std::future::Future<Output = Result<()>> + Send;

    fn apply_config_files(
        &self,
        base_dir: &Path,
        files: &[ConfigFileTarget],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn remove_install(
        &self,
        server: &GameServer,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn restart_host(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    fn update_host_packages(
        &self,
        packages: &[String],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<T: ServerControl> ServerControl for std::sync::Arc<T> {
    async fn observe(&self, server: &GameServer, external_addr: Option<&str>) -> ServerObservation {
        (**self).observe(server, external_addr).await
    }
    async fn start(&self, server: &GameServer, resources: &[LocalResource]) -> Result<()> {
        (**self).start(server, resources).await
    }
    async fn stop(&self, server: &GameServer) -> Result<()> {
        (**self).stop(server).await
    }
    async fn apply_config_files(&self, base_dir: &Path, files: &[ConfigFileTarget]) -> Result<()> {
        (**self).apply_config_files(base_dir, files).await
    }
    async fn remove_install(&self, server: &GameServer) -> Result<()> {
        (**self).remove_install(server).await
    }
    async fn restart_host(&self) -> Result<()> {
        (**self).restart_host().await
    }
    async fn update_host_packages(&self, packages: &[String]) -> Result<()> {
        (**self).update_host_packages(packages).await
    }
}

/// Regenerate config files on disk through the merge engine: parse what is
/// there, merge the desired items over it keeping existing ids, write the
/// re-serialized result. Content the desired set does not mention survives.
pub async fn regenerate_config_files(base_dir: &Path, files: &[ConfigFileTarget]) -> Result<()> {
    for file in files {
        let path = if Path::new(&file.path).is_absolute() {
            PathBuf::from(&file.path)
        } else {
            base_dir.join(&file.path)
        };

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => file
                .format
                .to_items(&content)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(_) => Vec::new(),
        };

        let merged = crate::configset::merge(&existing, &file.items, true);
        let rendered = file
            .format
            .to_format(&merged)
            .with_context(|| format!("rendering {}", path.display()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, rendered)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), format = %file.format, "config file regenerated");
    }
    Ok(())
}

/// Production control: spawns startup executables, tracks children per
/// server, probes reachability with bounded TCP connects.
pub struct ProcessServerControl {
    children: Mutex<HashMap<u64, Vec<Child>>>,
}

impl ProcessServerControl {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    async fn any_child_alive(&self, server_id: u64) -> bool {
        let mut children = self.children.lock().await;
        match children.get_mut(&server_id) {
            Some(list) => list
                .iter_mut()
                .any(|c| matches!(c.try_wait(), Ok(None))),
            None => false,
        }
    }
}

impl Default for ProcessServerControl {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe(addr: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::net::TcpStream::connect((addr, port)),
        )
        .await,
        Ok(Ok(_))
    )
}

impl ServerControl for ProcessServerControl {
    async fn observe(&self, server: &GameServer, external_addr: Option<&str>) -> ServerObservation {
        let process_running = self.any_child_alive(server.id).await;
        let internally_reachable = probe("127.0.0.1", server.query_port).await;
        let externally_reachable = match external_addr {
            Some(addr) => probe(addr, server.query_port).await,
            None => false,
        };
        ServerObservation {
            server_id: server.id,
            process_running,
            internally_reachable,
            externally_reachable,
            heartbeat_at: None,
            observed_at: Utc::now(),
        }
    }

    async fn start(&self, server: &GameServer, resources: &[LocalResource]) -> Result<()> {
        let mut startups: Vec<&LocalResource> = resources
            .iter()
            .filter(|r| r.startup && r.kind == ResourceKind::Executable)
            .collect();
        startups.sort_by_key(|r| r.startup_priority);
        if startups.is_empty() {
            bail!("server '{}' has no startup executables", server.name);
        }

        let mut spawned = Vec::new();
        for resource in startups {
            let exe = Path::new(&server.install_dir).join(&resource.path);
            // Launch arguments ride along as flat key=value config items.
            let args: Vec<String> = resource
                .config_items
                .iter()
                .map(|i| {
                    if i.value.is_empty() {
                        i.key.clone()
                    } else {
                        format!("{}={}", i.key, i.value)
                    }
                })
                .collect();
            let child = Command::new(&exe)
                .args(&args)
                .current_dir(&server.install_dir)
                .spawn()
                .with_context(|| format!("spawning {}", exe.display()))?;
            info!(server_id = server.id, exe = %exe.display(), "server process started");
            spawned.push(child);
        }

        self.children.lock().await.insert(server.id, spawned);
        Ok(())
    }

    async fn stop(&self, server: &GameServer) -> Result<()> {
        let mut children = self.children.lock().await;
        if let Some(mut list) = children.remove(&server.id) {
            for child in &mut list {
                if let Err(e) = child.kill().await {
                    warn!(server_id = server.id, error = %e, "kill failed");
                }
            }
        }
        Ok(())
    }

    async fn apply_config_files(&self, base_dir: &Path, files: &[ConfigFileTarget]) -> Result<()> {
        regenerate_config_files(base_dir, files).await
    }

    async fn remove_install(&self, server: &GameServer) -> Result<()> {
        tokio::fs::remove_dir_all(&server.install_dir)
            .await
            .with_context(|| format!("removing {}", server.install_dir))
    }

    async fn restart_host(&self) -> Result<()> {
        let status = Command::new("shutdown")
            .args(["-r", "+1"])
            .status()
            .await
            .context("running shutdown")?;
        if !status.success() {
            bail!("shutdown returned {}", status);
        }
        Ok(())
    }

    async fn update_host_packages(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let status = Command::new("apt-get")
            .arg("install")
            .arg("-y")
            .args(packages)
            .status()
            .await
            .context("running apt-get")?;
        if !status.success() {
            bail!("apt-get returned {}", status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configset::{ConfigFormat, ConfigItem};

    #[tokio::test]
    async fn regenerate_merges_over_existing_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Config/GameUserSettings.ini");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "[ServerSettings]\nMaxPlayers=20\nDifficulty=1.0\n")
            .await
            .unwrap();

        let files = vec![ConfigFileTarget {
            path: "Config/GameUserSettings.ini".to_string(),
            format: ConfigFormat::Sections,
            items: vec![ConfigItem::new("ServerSettings", "", "MaxPlayers", "70")],
        }];
        regenerate_config_files(dir.path(), &files).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("MaxPlayers=70"));
        // Unrelated keys survive the rewrite.
        assert!(content.contains("Difficulty=1.0"));
    }

    #[tokio::test]
    async fn regenerate_creates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![ConfigFileTarget {
            path: "launch.cfg".to_string(),
            format: ConfigFormat::KeyValue,
            items: vec![ConfigItem::new("", "", "port", "7777")],
        }];
        regenerate_config_files(dir.path(), &files).await.unwrap();

        let content = tokio::fs::read_to_string(dir.path().join("launch.cfg"))
            .await
            .unwrap();
        assert_eq!(content, "port=7777\n");
    }
}
