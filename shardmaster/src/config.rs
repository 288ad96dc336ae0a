use std::path::Path;

use serde::{Deserialize, Serialize};

/// `MIN_KEY`/`MAX_KEY` and the bind address, loadable from a TOML file
/// with CLI flags able to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub min_key: u32,
    pub max_key: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9000".to_string(),
            min_key: 0,
            max_key: 999,
        }
    }
}

impl Config {
    pub fn num_shards(&self) -> u32 {
        self.max_key - self.min_key + 1
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
