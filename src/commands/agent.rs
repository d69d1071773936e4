use anyhow::Result;

use crate::config;

pub fn run(
    controller_url: Option<String>,
    host_name: Option<String>,
    log_level: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    let mut agent_config = if let Some(path) = config_path {
        let content = std::fs::read_to_string(&path)?;
        let cfg: config::Config = toml::from_str(&content)?;
        cfg.agent.unwrap_or_default()
    } else {
        let cfg = config::load()?;
        cfg.agent.unwrap_or_default()
    };

    if let Some(url) = controller_url {
        agent_config.controller_url = url;
    }
    if let Some(name) = host_name {
        agent_config.host_name = Some(name);
    }
    if let Some(level) = log_level {
        agent_config.log_level = level;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::agent::run(agent_config))
}
