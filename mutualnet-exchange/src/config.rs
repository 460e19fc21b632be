//! Exchange node configuration: a TOML file with CLI overrides
//! (SPEC_FULL.md §0.3), mirroring `mutualnet_directory::config`.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    pub region: u8,
    pub listen_addr: String,
    pub listen_port: u16,
    pub directory_addr: String,
    pub directory_port: u16,
    pub catalogue_path: PathBuf,
    pub inventory_path: PathBuf,
    pub precommit_log_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "ExA".to_string(),
            region: 0,
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9100,
            directory_addr: "127.0.0.1".to_string(),
            directory_port: 9000,
            catalogue_path: PathBuf::from("catalogue.json"),
            inventory_path: PathBuf::from("inventory.json"),
            precommit_log_path: PathBuf::from("precommit.jsonl"),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits; a missing file is not fatal (CLI defaults apply, §0.3).
    pub fn load(path: Option<&PathBuf>) -> mutualnet_core::error::Result<Self> {
        match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)
                    .map_err(|e| mutualnet_core::error::MutualNetError::protocol(e.to_string()))
            }
            _ => Ok(Self::default()),
        }
    }
}

/// CLI overrides layered on top of `NodeConfig` (§0.3).
#[derive(Debug, Parser)]
#[command(name = "mutualnet-exchange", about = "Mutualnet exchange node")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub region: Option<u8>,

    #[arg(long)]
    pub listen_addr: Option<String>,

    #[arg(long)]
    pub listen_port: Option<u16>,

    #[arg(long)]
    pub directory_addr: Option<String>,

    #[arg(long)]
    pub directory_port: Option<u16>,

    #[arg(long)]
    pub catalogue_path: Option<PathBuf>,

    #[arg(long)]
    pub inventory_path: Option<PathBuf>,

    #[arg(long)]
    pub precommit_log_path: Option<PathBuf>,
}

impl Cli {
    pub fn apply(self, mut config: NodeConfig) -> NodeConfig {
        if let Some(v) = self.name {
            config.name = v;
        }
        if let Some(v) = self.region {
            config.region = v;
        }
        if let Some(v) = self.listen_addr {
            config.listen_addr = v;
        }
        if let Some(v) = self.listen_port {
            config.listen_port = v;
        }
        if let Some(v) = self.directory_addr {
            config.directory_addr = v;
        }
        if let Some(v) = self.directory_port {
            config.directory_port = v;
        }
        if let Some(v) = self.catalogue_path {
            config.catalogue_path = v;
        }
        if let Some(v) = self.inventory_path {
            config.inventory_path = v;
        }
        if let Some(v) = self.precommit_log_path {
            config.precommit_log_path = v;
        }
        config
    }
}
