use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

use ra_core::SceneConfig;

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "annotations.db";
pub const DATA_DIR_ENV: &str = "RA_DATA_DIR";

/// Host configuration, read from `<data dir>/config.toml`.
///
/// ```toml
/// [scene]
/// update_interval = 0.05
/// max_visible_distance = 12.0
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scene: SceneConfig,
}

impl Config {
    /// Load `config.toml` from `dir`. A missing file yields defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::parse(&content)
                    .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
                tracing::debug!("loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Data directory: `$RA_DATA_DIR` if set, else `~/.reality-annotation`.
pub fn default_base_dir() -> PathBuf {
    match env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs_home().join(".reality-annotation"),
    }
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
