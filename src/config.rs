use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub controller: Option<ControllerConfig>,
    pub agent: Option<AgentConfig>,
}

/// Control-plane daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub http_addr: String,
    pub log_level: String,
    /// Watcher tick interval.
    pub watcher_tick_secs: u64,
    /// A host silent longer than this is marked Unreachable.
    pub host_silence_secs: u64,
    /// Interval for the terminal-item purge and stale-in-progress sweep.
    pub purge_interval_secs: u64,
    /// InProgress items older than this are swept to Failed.
    pub stale_in_progress_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9400".to_string(),
            log_level: "info".to_string(),
            watcher_tick_secs: 30,
            host_silence_secs: 180,
            purge_interval_secs: 300,
            stale_in_progress_secs: 3600,
        }
    }
}

/// Host-agent daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub controller_url: String,
    /// Host name to check in as; defaults to the machine hostname.
    pub host_name: Option<String>,
    pub log_level: String,
    /// Command-loop poll interval while the queue is empty.
    pub poll_interval_secs: u64,
    pub checkin_interval_secs: u64,
    /// Short backoff while the control plane does not know this host.
    pub unregistered_backoff_secs: u64,
    /// Longer backoff while the control plane is unreachable.
    pub unreachable_backoff_secs: u64,
    /// External update tool (steamcmd-style); invocations are serialized.
    pub update_tool: String,
    /// Bounded wait after starting a server before judging first-run init.
    pub spinup_wait_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller_url: "http://127.0.0.1:9400".to_string(),
            host_name: None,
            log_level: "info".to_string(),
            poll_interval_secs: 5,
            checkin_interval_secs: 60,
            unregistered_backoff_secs: 5,
            unreachable_backoff_secs: 30,
            update_tool: "steamcmd".to_string(),
            spinup_wait_secs: 15,
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("garrison").join("config.toml"))
    }
}

pub fn load() -> Result<Config> {
    let path = Config::path()?;
    load_from(&path)
}

pub fn load_from(path: &PathBuf) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/garrison/config.toml");
        let config = load_from(&path).unwrap();
        assert!(config.controller.is_none());
        assert!(config.agent.is_none());
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[controller]\nhttp_addr = \"0.0.0.0:9500\"\n\n[agent]\nupdate_tool = \"/opt/steamcmd/steamcmd.sh\"\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        let controller = config.controller.unwrap();
        assert_eq!(controller.http_addr, "0.0.0.0:9500");
        assert_eq!(controller.watcher_tick_secs, 30);

        let agent = config.agent.unwrap();
        assert_eq!(agent.update_tool, "/opt/steamcmd/steamcmd.sh");
        assert_eq!(agent.poll_interval_secs, 5);
    }
}
