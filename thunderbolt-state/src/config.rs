//! State storage configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use thunderbolt_chain::parameters::Network;

/// Configuration for the persistent state.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The root directory for all persistent data. Each network gets
    /// its own subdirectory, so mainnet and testnet state never mix.
    pub cache_dir: PathBuf,

    /// The size at which block and revert log segments roll over to a
    /// new file, in bytes.
    pub segment_bytes: u64,
}

impl Config {
    /// The directory holding this network's state.
    pub fn network_dir(&self, network: Network) -> PathBuf {
        self.cache_dir.join(network.to_string())
    }

    /// The sled configuration for this network's metadata index.
    pub fn sled_config(&self, network: Network) -> sled::Config {
        sled::Config::default().path(self.network_dir(network).join("meta"))
    }

    /// The directory of block log segments.
    pub fn block_log_dir(&self, network: Network) -> PathBuf {
        self.network_dir(network).join("blocks")
    }

    /// The directory of revert log segments.
    pub fn revert_log_dir(&self, network: Network) -> PathBuf {
        self.network_dir(network).join("reverts")
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap().join("cache"))
            .join("thunderbolt");

        Self {
            cache_dir,
            segment_bytes: 128 * 1024 * 1024,
        }
    }
}
