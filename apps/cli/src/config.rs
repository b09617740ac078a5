//! Layered configuration: defaults, then a TOML file, then `LOGPIPE_BUS__*`
//! environment variables. Command-line flags are applied on top by the
//! commands themselves.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Toml};
use logpipe_bus::BusSettings;
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "logpipe.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub bus: BusSettings,
    pub log: logpipe_log::Config,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            bus: BusSettings::default(),
            log: logpipe_log::Config::from_env(),
        }
    }
}

impl CliConfig {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`]) and the environment.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                anyhow::ensure!(path.exists(), "config file {} not found", path.display());
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&file))
            .merge(
                Env::prefixed("LOGPIPE_")
                    .filter(|key| key.as_str().to_ascii_lowercase().starts_with("bus__"))
                    .split("__"),
            )
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", file.display()))
    }

    /// Bus settings with the bootstrap address replaced when given.
    pub fn bus_for(&self, bootstrap_servers: Option<&str>) -> BusSettings {
        let mut settings = self.bus.clone();
        if let Some(servers) = bootstrap_servers {
            settings.bootstrap_servers = servers.to_string();
        }
        settings
    }
}
