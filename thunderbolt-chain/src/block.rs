//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

use thunderbolt_serde_derive::TbSerialize;

pub use hash::Hash;
pub use header::{CountedHeader, Header};
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

use crate::{transaction::Transaction, transparent, ThunderboltSerialize};

/// A block, containing a header and a list of transactions.
///
/// The header commits to the transactions through the merkle root, so
/// the block hash (a hash of the header alone) binds the entire block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, TbSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions, coinbase first.
    pub transactions: Vec<Arc<Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }

        fmter.field("hash", &self.hash()).finish()
    }
}

impl Block {
    /// Return the block height recorded in the coinbase input, if any.
    pub fn coinbase_height(&self) -> Option<Height> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { height, .. } => Some(*height),
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The length of this block when serialized, in bytes.
    pub fn serialized_size(&self) -> usize {
        let tx_bytes: usize = self
            .transactions
            .iter()
            .map(|tx| tx.serialized_size())
            .sum();
        Header::len() + 4 + tx_bytes
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
