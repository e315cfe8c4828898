//! Genesis consensus parameters for each Thunderbolt network.

use std::convert::TryFrom;
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::amount::{Amount, COIN};
use crate::block::{self, merkle, Block, Header, Height};
use crate::parameters::Network;
use crate::transaction::Transaction;
use crate::transparent::{CoinbaseData, Input, LockScript, Output};

/// The previous block hash for the genesis block.
///
/// All networks use the `null` hash (all zeroes) for the parent of the
/// genesis block.
pub const GENESIS_PARENT_HASH: block::Hash = block::Hash([0; 32]);

lazy_static! {
    static ref MAINNET_GENESIS: Arc<Block> = build_genesis(
        Network::Mainnet,
        b"The lightning network is not the lightning in question",
        1554076800,
    );
    static ref TESTNET_GENESIS: Arc<Block> = build_genesis(
        Network::Testnet,
        b"thunderbolt testnet genesis",
        1554076800,
    );
}

/// Returns the genesis block for `network`.
///
/// Genesis is constructed, not mined: the engine commits it without a
/// proof-of-work check, and every later block chains from its hash.
pub fn genesis_block(network: Network) -> Arc<Block> {
    match network {
        Network::Mainnet => MAINNET_GENESIS.clone(),
        Network::Testnet => TESTNET_GENESIS.clone(),
    }
}

/// Returns the hash of the genesis block for `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    genesis_block(network).hash()
}

fn build_genesis(network: Network, motto: &[u8], timestamp: u64) -> Arc<Block> {
    let subsidy = Amount::try_from(50 * COIN).expect("genesis subsidy is within range");

    // The genesis subsidy is burned: nothing can ever satisfy an
    // Unlockable lock, so the supply effectively starts at zero.
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Height(0),
            data: CoinbaseData::new(motto.to_vec()).expect("genesis motto fits"),
        }],
        vec![Output {
            value: subsidy,
            lock_script: LockScript::unlockable(),
        }],
        0,
    );

    let merkle_root: merkle::Root = std::iter::once(coinbase.hash()).collect();

    let header = Header::new(
        1,
        GENESIS_PARENT_HASH,
        merkle_root,
        timestamp,
        network.pow_limit(),
        0,
    );

    Arc::new(Block {
        header,
        transactions: vec![Arc::new(coinbase)],
    })
}
