//! Network parameters and consensus constants.

mod genesis;

pub use genesis::{genesis_block, genesis_hash, GENESIS_PARENT_HASH};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::work::difficulty::CompactDifficulty;

/// An enum describing the possible network choices.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The test network.
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl Network {
    /// The easiest target this network ever allows. Retargets cap here,
    /// and every block's expanded target must not exceed it.
    pub fn pow_limit(&self) -> CompactDifficulty {
        match self {
            // A leading-zero-byte target in the production network.
            Network::Mainnet => CompactDifficulty(0x1d00_ffff),
            // Easy enough for test chains to grind nonces in microseconds.
            Network::Testnet => CompactDifficulty(0x2007_ffff),
        }
    }

    /// The default peer-to-peer listening port.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8533,
            Network::Testnet => 18533,
        }
    }
}

/// Blocks between difficulty retargets. A block whose height is an
/// exact multiple of this interval carries recomputed bits.
pub const RETARGET_INTERVAL: u64 = 2016;

/// The intended wall-clock span of one retarget interval, in seconds
/// (two weeks, i.e. one block per ten minutes).
pub const TARGET_TIMESPAN_SECONDS: u64 = 14 * 24 * 60 * 60;

/// The number of blocks that must bury a coinbase output before it may
/// be spent.
pub const COINBASE_MATURITY: u64 = 100;
