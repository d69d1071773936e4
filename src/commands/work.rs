//! `garrison work` — enqueue and cancel work items.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::api::rest::CreateWorkRequest;
use crate::domain::work::{TargetType, WorkStatus};

use super::{client_from, print_output};

#[derive(Subcommand)]
pub enum WorkCommands {
    /// Enqueue a work item for a host or one of its game servers
    Enqueue {
        /// Target host id
        #[arg(long)]
        host: u64,

        /// Target game server id (required for game-server commands)
        #[arg(long)]
        server: Option<u64>,

        /// Command to enqueue
        target: TargetType,

        /// Command payload as JSON (fields beyond the command tag)
        #[arg(long)]
        data: Option<String>,
    },
    /// Cancel a work item that has not finished
    Cancel {
        /// Work item id
        id: u64,
    },
}

pub fn run(controller_url: Option<&str>, format: &str, command: &WorkCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(controller_url, format, command))
}

async fn run_async(
    controller_url: Option<&str>,
    format: &str,
    command: &WorkCommands,
) -> Result<()> {
    let client = client_from(controller_url)?;

    match command {
        WorkCommands::Enqueue {
            host,
            server,
            target,
            data,
        } => {
            let work_data = payload_for(*target, data.as_deref())?;
            let item = client
                .create_work(&CreateWorkRequest {
                    host_id: *host,
                    game_server_id: *server,
                    target_type: *target,
                    work_data,
                    created_by: "cli".to_string(),
                })
                .await?;
            print_output(format, &item)
        }
        WorkCommands::Cancel { id } => {
            let item = client.update_work_status(*id, WorkStatus::Cancelled).await?;
            print_output(format, &item)
        }
    }
}

/// Build the opaque payload: the command tag from the target type, merged
/// with any extra fields given as JSON.
fn payload_for(target: TargetType, data: Option<&str>) -> Result<serde_json::Value> {
    let command = serde_json::to_value(target).context("serializing target type")?;
    let mut payload = serde_json::Map::new();
    payload.insert("command".to_string(), command);

    if let Some(raw) = data {
        let extra: serde_json::Value = serde_json::from_str(raw).context("parsing --data JSON")?;
        let serde_json::Value::Object(map) = extra else {
            bail!("--data must be a JSON object");
        };
        for (key, value) in map {
            if key == "command" {
                bail!("--data may not override the command tag");
            }
            payload.insert(key, value);
        }
    }
    Ok(serde_json::Value::Object(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::work::WorkPayload;

    #[test]
    fn payload_decodes_into_the_typed_vocabulary() {
        let value = payload_for(
            TargetType::UpdateGameServer,
            Some(r#"{"app_id": "376030", "validate": true}"#),
        )
        .unwrap();
        let payload: WorkPayload = serde_json::from_value(value).unwrap();
        assert!(matches!(
            payload,
            WorkPayload::UpdateGameServer { ref app_id, validate: true } if app_id == "376030"
        ));
    }

    #[test]
    fn command_tag_cannot_be_overridden() {
        let err = payload_for(
            TargetType::StopGameServer,
            Some(r#"{"command": "restart_host"}"#),
        )
        .unwrap_err();
        assert!(err.to_string().contains("command tag"));
    }
}
