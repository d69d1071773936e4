//! `garrison queue` — inspect and maintain the controller's work queue.

use anyhow::Result;
use clap::Subcommand;

use crate::domain::work::TargetBand;

use super::{client_from, print_output};

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Per-status item counts for a band
    Counts {
        /// Work band (host or game-server)
        #[arg(long, default_value = "game-server")]
        band: TargetBand,
    },
    /// Peek the oldest waiting item in a band without claiming it
    Next {
        #[arg(long, default_value = "game-server")]
        band: TargetBand,
    },
    /// In-flight items (picked up or in progress) for a band
    InProgress {
        #[arg(long, default_value = "game-server")]
        band: TargetBand,
    },
    /// Show a single work item
    Show {
        /// Work item id
        id: u64,
    },
    /// Delete all terminal (completed/failed) items
    Purge,
}

pub fn run(controller_url: Option<&str>, format: &str, command: &QueueCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(controller_url, format, command))
}

async fn run_async(
    controller_url: Option<&str>,
    format: &str,
    command: &QueueCommands,
) -> Result<()> {
    let client = client_from(controller_url)?;

    match command {
        QueueCommands::Counts { band } => {
            let data = client.work_counts(*band).await?;
            print_output(format, &data)
        }
        QueueCommands::Next { band } => match client.next_waiting(*band).await? {
            Some(item) => print_output(format, &item),
            None => {
                println!("no waiting work in band {}", band);
                Ok(())
            }
        },
        QueueCommands::InProgress { band } => {
            let data = client.work_in_progress(*band).await?;
            print_output(format, &data)
        }
        QueueCommands::Show { id } => {
            let data = client.work(*id).await?;
            print_output(format, &data)
        }
        QueueCommands::Purge => {
            let data = client.purge().await?;
            print_output(format, &data)
        }
    }
}
