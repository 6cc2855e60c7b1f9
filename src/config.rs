//! Roller configuration
//!
//! Layered defaults → TOML file → `QUICKDICE_*` environment variables;
//! command-line flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollerConfig {
    /// Id stamped on broadcast events and history entries
    pub player_id: String,
    /// Seeds local dice and remote roll requests
    pub seed: Option<u64>,
    /// Bound on each dice phase
    pub roll_timeout_ms: u64,
    pub history_limit: usize,
    /// SQLite file for saved commands; in-memory when absent
    pub db_path: Option<String>,
    /// Keep results out of the broadcast
    pub hidden: bool,
}

impl Default for RollerConfig {
    fn default() -> Self {
        Self {
            player_id: "player".to_string(),
            seed: None,
            roll_timeout_ms: 12_000,
            history_limit: 20,
            db_path: None, // None = in-memory
            hidden: false,
        }
    }
}

impl RollerConfig {
    pub const ENV_PREFIX: &'static str = "QUICKDICE_";

    fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(RollerConfig::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        };
        figment.merge(Env::prefixed(Self::ENV_PREFIX))
    }

    /// Load configuration; an explicitly given file must exist
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(figment::Error::from(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }
        Self::figment(path).extract()
    }

    pub fn roll_timeout(&self) -> Duration {
        Duration::from_millis(self.roll_timeout_ms)
    }
}
