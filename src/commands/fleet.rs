//! `garrison fleet` — register and inspect hosts, game servers, and
//! profiles on the controller.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use crate::api::rest::{CreateProfileRequest, CreateServerRequest};
use crate::domain::types::ConnectivityState;

use super::{client_from, print_output};

#[derive(Subcommand)]
pub enum FleetCommands {
    /// List registered hosts
    Hosts,
    /// List registered game servers
    Servers,
    /// Show a single game server
    Show {
        /// Game server id
        id: u64,
    },
    /// Register a host
    AddHost {
        /// Host name the agent will check in as
        name: String,
        /// Address agents and players reach the host on
        address: String,
    },
    /// Register a game server on a host
    AddServer {
        #[arg(long)]
        host: u64,
        #[arg(long)]
        profile: u64,
        name: String,
        #[arg(long)]
        install_dir: String,
        #[arg(long)]
        query_port: u16,
    },
    /// Register a game profile
    AddProfile {
        name: String,
        /// Steam app id for install/update
        #[arg(long)]
        app_id: Option<String>,
        /// Path to a JSON file with the profile's resource list
        #[arg(long)]
        resources: Option<String>,
    },
}

pub fn run(controller_url: Option<&str>, format: &str, command: &FleetCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(controller_url, format, command))
}

async fn run_async(
    controller_url: Option<&str>,
    format: &str,
    command: &FleetCommands,
) -> Result<()> {
    let client = client_from(controller_url)?;

    match command {
        FleetCommands::Hosts => {
            let hosts = client.hosts().await?;
            if format == "json" {
                return print_output(format, &hosts);
            }
            println!("{}", "Hosts".bold());
            println!();
            for host in hosts {
                println!(
                    "  {} {} ({}) — {}",
                    state_icon(host.state),
                    host.name.bold(),
                    host.address.dimmed(),
                    host.state
                );
            }
            println!();
            Ok(())
        }
        FleetCommands::Servers => {
            let servers = client.servers().await?;
            if format == "json" {
                return print_output(format, &servers);
            }
            println!("{}", "Game Servers".bold());
            println!();
            for server in servers {
                println!(
                    "  {} #{} {} (host {}, port {}) — {}",
                    state_icon(server.state),
                    server.id,
                    server.name.bold(),
                    server.host_id,
                    server.query_port,
                    server.state
                );
            }
            println!();
            Ok(())
        }
        FleetCommands::Show { id } => {
            let server = client.server(*id).await?;
            print_output(format, &server)
        }
        FleetCommands::AddHost { name, address } => {
            let host = client.create_host(name, address).await?;
            print_output(format, &host)
        }
        FleetCommands::AddServer {
            host,
            profile,
            name,
            install_dir,
            query_port,
        } => {
            let server = client
                .create_server(&CreateServerRequest {
                    host_id: *host,
                    profile_id: *profile,
                    name: name.clone(),
                    install_dir: install_dir.clone(),
                    query_port: *query_port,
                })
                .await?;
            print_output(format, &server)
        }
        FleetCommands::AddProfile {
            name,
            app_id,
            resources,
        } => {
            let resources = match resources {
                Some(path) => {
                    let content = std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path))?;
                    serde_json::from_str(&content)
                        .with_context(|| format!("parsing resources in {}", path))?
                }
                None => Vec::new(),
            };
            let profile = client
                .create_profile(&CreateProfileRequest {
                    name: name.clone(),
                    app_id: app_id.clone(),
                    resources,
                })
                .await?;
            print_output(format, &profile)
        }
    }
}

fn state_icon(state: ConnectivityState) -> colored::ColoredString {
    if state == ConnectivityState::Connectable {
        "ok".green().bold()
    } else if state.is_doing_something() {
        "..".yellow().bold()
    } else if state == ConnectivityState::Unreachable || state == ConnectivityState::Stalled {
        "!!".red().bold()
    } else {
        "--".dimmed()
    }
}
