//! Directory configuration: a TOML file with CLI overrides (SPEC_FULL.md
//! §0.3), following the `forest`-style config-struct-plus-clap-overlay
//! pattern in this pack.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub listen_addr: String,
    pub listen_port: u16,
    /// Host used for the directory's liveness probe against registered
    /// super-peers; all nodes run on this host in the local multi-process
    /// demo/test setup.
    pub probe_host: String,
    /// How often the logical clock advances by one tick. The real
    /// wall-clock advancer is an excluded external collaborator
    /// (spec.md §1); this interval drives a stand-in for local runs.
    pub tick_interval_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9000,
            probe_host: "127.0.0.1".to_string(),
            tick_interval_secs: 30,
        }
    }
}

impl DirectoryConfig {
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

/// CLI overrides layered on top of `DirectoryConfig` (§0.3).
#[derive(Debug, Parser)]
#[command(name = "mutualnet-directory", about = "Mutualnet registration directory")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub listen_addr: Option<String>,

    #[arg(long)]
    pub listen_port: Option<u16>,

    #[arg(long)]
    pub probe_host: Option<String>,

    #[arg(long)]
    pub tick_interval_secs: Option<u64>,
}

impl Cli {
    pub fn apply(self, mut config: DirectoryConfig) -> DirectoryConfig {
        if let Some(v) = self.listen_addr {
            config.listen_addr = v;
        }
        if let Some(v) = self.listen_port {
            config.listen_port = v;
        }
        if let Some(v) = self.probe_host {
            config.probe_host = v;
        }
        if let Some(v) = self.tick_interval_secs {
            config.tick_interval_secs = v;
        }
        config
    }
}
