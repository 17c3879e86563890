//! Node-level configuration loading.
//!
//! Wraps the protocol [`ChainConfig`] with process concerns (log filter,
//! checkpoint file location) and loads everything through the `config`
//! crate from an optional JSON/TOML file over built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sable_core::config::ChainConfig;

/// Full node configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
    #[serde(flatten)]
    pub chain: ChainConfig,
    /// Log level filter string (e.g. "info", "sable_node=debug").
    pub log_level: String,
    /// Location of `checkpoints.json`. Optional; no file means no pins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoints_file: Option<PathBuf>,
}

impl NodeConfig {
    /// Load configuration from an optional file (JSON or TOML); absent file
    /// means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let loaded: Self = match path {
            Some(path) => config::Config::builder()
                .add_source(config::File::from(path))
                .build()?
                .try_deserialize()?,
            None => Self::default(),
        };
        Ok(loaded.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.log_level.is_empty() {
            self.log_level = "info".into();
        }
        self
    }

    /// Default data directory under the platform data dir, falling back to
    /// the configured relative path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("sable"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Snapshot file path from the chain's storage section.
    pub fn blockchain_path(&self) -> PathBuf {
        self.chain.blockchain_path()
    }
}
