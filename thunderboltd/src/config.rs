//! Daemon configuration: one TOML file covering every component.

use serde::{Deserialize, Serialize};

use thunderbolt_chain::transparent::LockScript;

/// The daemon's configuration, deserialized from TOML.
///
/// Every section has working defaults, so an empty file (or none at
/// all) starts a mainnet node under the platform cache directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ThunderboltdConfig {
    /// Peer-to-peer settings.
    pub network: thunderbolt_network::Config,

    /// Persistent state settings.
    pub state: thunderbolt_state::Config,

    /// The mempool relay floor, in atomic units per 1000 bytes.
    /// Zero accepts any fee.
    pub min_relay_fee_per_kb: u64,

    /// The hex-encoded compressed public key block rewards pay to.
    /// `getWork` is unavailable until one is configured.
    pub miner_payout_key: Option<String>,

    /// A tracing filter directive, e.g. `info,thunderbolt_network=debug`.
    pub tracing_filter: Option<String>,
}

impl ThunderboltdConfig {
    /// The lock script mined rewards pay to, if a key is configured.
    pub fn miner_payout_lock(&self) -> Result<Option<LockScript>, hex::FromHexError> {
        match &self.miner_payout_key {
            Some(key) => Ok(Some(LockScript::single_sig(hex::decode(key)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_with_defaults() {
        let config: ThunderboltdConfig = toml::from_str("").expect("defaults parse");
        assert_eq!(config.min_relay_fee_per_kb, 0);
        assert!(config.miner_payout_key.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config: ThunderboltdConfig = toml::from_str(
            r#"
            min_relay_fee_per_kb = 1000

            [network]
            listen_addr = "127.0.0.1:18533"
            network = "Testnet"
            target_outbound_peers = 4
            "#,
        )
        .expect("valid config parses");

        assert_eq!(config.min_relay_fee_per_kb, 1000);
        assert_eq!(config.network.target_outbound_peers, 4);
    }

    #[test]
    fn payout_key_decodes_to_a_lock() {
        let mut config = ThunderboltdConfig::default();
        config.miner_payout_key = Some(hex::encode([2u8; 33]));
        assert!(config.miner_payout_lock().unwrap().is_some());

        config.miner_payout_key = Some("not hex".to_owned());
        assert!(config.miner_payout_lock().is_err());
    }
}
