//! Configuration schema for lease-proxy
//!
//! Configuration is stored at `~/.config/lease-proxy/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Read settings for proxied content
    pub read: ReadConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Settings for reading through a proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Bytes requested from the proxy per read
    pub chunk_size: usize,

    /// Revoke all cached leases after this many reads (0 = never)
    pub revoke_every: u64,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            revoke_every: 0,
        }
    }
}
