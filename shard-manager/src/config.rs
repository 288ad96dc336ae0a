use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub shardmaster_address: String,
    pub check_interval_ms: u64,
    pub dead_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9100".to_string(),
            shardmaster_address: "127.0.0.1:9000".to_string(),
            check_interval_ms: 1_000,
            dead_interval_ms: 3_000,
        }
    }
}

impl Config {
    /// Cadence of the background heartbeat checker (every 1s by default).
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn dead_interval(&self) -> Duration {
        Duration::from_millis(self.dead_interval_ms)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
