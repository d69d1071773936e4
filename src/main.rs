mod agent;
mod api;
mod client;
mod commands;
mod config;
mod configset;
mod domain;
mod server;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "garrison", version, about = "Game-server fleet controller and host agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control-plane daemon (REST API, watcher, queue maintenance)
    Controller {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Path to config file (default: ~/.config/garrison/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Run the host agent daemon (check-in, command loop, tool runner)
    Agent {
        /// Controller base URL (overrides config)
        #[arg(long)]
        controller_url: Option<String>,

        /// Host name to check in as (defaults to the machine hostname)
        #[arg(long)]
        host_name: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Path to config file (default: ~/.config/garrison/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Inspect and maintain the controller's work queue
    Queue {
        /// Controller base URL
        #[arg(long, global = true)]
        controller_url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::queue::QueueCommands,
    },

    /// Enqueue and cancel work items
    Work {
        /// Controller base URL
        #[arg(long, global = true)]
        controller_url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::work::WorkCommands,
    },

    /// Register and inspect hosts, game servers, and profiles
    Fleet {
        /// Controller base URL
        #[arg(long, global = true)]
        controller_url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::fleet::FleetCommands,
    },

    /// Convert and merge configuration files locally
    Config {
        #[command(subcommand)]
        command: commands::configfile::ConfigCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Controller {
            http_addr,
            log_level,
            config,
        } => commands::controller::run(http_addr, log_level, config),
        Commands::Agent {
            controller_url,
            host_name,
            log_level,
            config,
        } => commands::agent::run(controller_url, host_name, log_level, config),
        Commands::Queue {
            controller_url,
            format,
            command,
        } => commands::queue::run(controller_url.as_deref(), &format, &command),
        Commands::Work {
            controller_url,
            format,
            command,
        } => commands::work::run(controller_url.as_deref(), &format, &command),
        Commands::Fleet {
            controller_url,
            format,
            command,
        } => commands::fleet::run(controller_url.as_deref(), &format, &command),
        Commands::Config { command } => commands::configfile::run(&command),
    }
}
