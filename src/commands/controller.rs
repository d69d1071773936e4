use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    // Load config from file (custom path or default)
    let mut controller_config = if let Some(path) = config_path {
        let content = std::fs::read_to_string(&path)?;
        let cfg: config::Config = toml::from_str(&content)?;
        cfg.controller.unwrap_or_default()
    } else {
        let cfg = config::load()?;
        cfg.controller.unwrap_or_default()
    };

    // CLI flags override config values
    if let Some(addr) = http_addr {
        controller_config.http_addr = addr;
    }
    if let Some(level) = log_level {
        controller_config.log_level = level;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(controller_config))
}
