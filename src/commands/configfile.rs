//! `garrison config` — run the merge engine against local files.
//!
//! Useful for previewing what an agent would write, and for converting
//! documents between the supported formats.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::configset::{merge, ConfigFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Convert a document from one format to another
    Convert {
        /// Input file
        input: PathBuf,
        #[arg(long)]
        from: ConfigFormat,
        #[arg(long)]
        to: ConfigFormat,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Merge an overlay document into a base document of the same format
    Merge {
        /// Base file (existing content)
        base: PathBuf,
        /// Overlay file (takes priority)
        overlay: PathBuf,
        #[arg(long)]
        format: ConfigFormat,
        /// Keep item ids from the base where base and overlay collide
        #[arg(long)]
        keep_existing_ids: bool,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show a document as normalized configuration items (JSON)
    Items {
        input: PathBuf,
        #[arg(long)]
        format: ConfigFormat,
    },
}

pub fn run(command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Convert {
            input,
            from,
            to,
            output,
        } => {
            let doc = read(input)?;
            let items = from.to_items(&doc)?;
            let rendered = to.to_format(&items)?;
            write(output.as_deref(), &rendered)
        }
        ConfigCommands::Merge {
            base,
            overlay,
            format,
            keep_existing_ids,
            output,
        } => {
            let existing = format.to_items(&read(base)?)?;
            let priority = format.to_items(&read(overlay)?)?;
            let merged = merge(&existing, &priority, *keep_existing_ids);
            let rendered = format.to_format(&merged)?;
            write(output.as_deref(), &rendered)
        }
        ConfigCommands::Items { input, format } => {
            let items = format.to_items(&read(input)?)?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(())
        }
    }
}

fn read(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write(path: Option<&std::path::Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("writing {}", path.display())),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}
