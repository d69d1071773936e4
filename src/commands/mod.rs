pub mod agent;
pub mod configfile;
pub mod controller;
pub mod fleet;
pub mod queue;
pub mod work;

use anyhow::Result;

use crate::client::{GarrisonClient, DEFAULT_BASE_URL};
use crate::config;

/// Resolve the controller URL: explicit flag, then the agent config
/// section, then the local default.
pub(crate) fn client_from(controller_url: Option<&str>) -> Result<GarrisonClient> {
    let url = match controller_url {
        Some(url) => url.to_string(),
        None => config::load()?
            .agent
            .map(|a| a.controller_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    };
    GarrisonClient::new(&url)
}

pub(crate) fn print_output<T: serde::Serialize>(format: &str, data: &T) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
        _ => {
            // Table format: recursive key-value from serde_json::Value
            let value = serde_json::to_value(data)?;
            print_value(&value, 0);
        }
    }
    Ok(())
}

fn print_value(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                match val {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}{}:", pad, key);
                        print_value(val, indent + 1);
                    }
                    _ => println!("{}{}: {}", pad, key, scalar(val)),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                match item {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}-", pad);
                        print_value(item, indent + 1);
                    }
                    _ => println!("{}- {}", pad, scalar(item)),
                }
            }
        }
        _ => println!("{}{}", pad, scalar(value)),
    }
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
