//! Configuration merge engine: a normalized item model, a generic merge
//! algorithm, and codecs for the four supported on-disk formats.

pub mod item;
pub mod keyvalue;
pub mod lines;
pub mod sections;
pub mod tree;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub use item::{merge, ConfigItem};

/// The on-disk formats the engine can normalize and regenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// INI-style sections with plain and parenthesized grouped values.
    Sections,
    /// Flat `key=value` map.
    KeyValue,
    /// Hierarchical JSON tree.
    Tree,
    /// Raw lines keyed by line number.
    Lines,
}

impl ConfigFormat {
    /// Normalize a source document into configuration items.
    pub fn to_items(self, doc: &str) -> Result<Vec<ConfigItem>> {
        match self {
            Self::Sections => Ok(sections::parse(doc)),
            Self::KeyValue => Ok(keyvalue::parse(doc)),
            Self::Tree => tree::parse(doc),
            Self::Lines => Ok(lines::parse(doc)),
        }
    }

    /// Regenerate a document in this format from configuration items.
    pub fn to_format(self, items: &[ConfigItem]) -> Result<String> {
        match self {
            Self::Sections => Ok(sections::render(items)),
            Self::KeyValue => Ok(keyvalue::render(items)),
            Self::Tree => tree::render(items),
            Self::Lines => Ok(lines::render(items)),
        }
    }
}

impl std::str::FromStr for ConfigFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sections" | "ini" => Ok(Self::Sections),
            "keyvalue" | "kv" => Ok(Self::KeyValue),
            "tree" | "json" => Ok(Self::Tree),
            "lines" => Ok(Self::Lines),
            other => bail!("unknown config format '{}'", other),
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sections => "sections",
            Self::KeyValue => "keyvalue",
            Self::Tree => "tree",
            Self::Lines => "lines",
        };
        f.write_str(name)
    }
}
