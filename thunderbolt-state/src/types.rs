//! The record types the metadata index stores.

use bitflags::bitflags;
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

use thunderbolt_chain::{
    block::{self, Header, Height},
    transparent,
    work::difficulty::Work,
    SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};

use crate::LogPointer;

bitflags! {
    /// Status flags carried by every persisted block's metadata.
    pub struct BlockStatus: u8 {
        /// The block passed full validation when it was persisted.
        const VALID = 0b0000_0001;
        /// The block is connected on the active chain.
        const ON_MAIN_CHAIN = 0b0000_0010;
    }
}

impl ThunderboltSerialize for BlockStatus {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.bits().thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for BlockStatus {
    fn thunderbolt_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let bits = u8::thunderbolt_deserialize(reader)?;
        BlockStatus::from_bits(bits).ok_or(SerializationError::Parse("unknown block status bits"))
    }
}

/// Everything the index knows about one persisted block.
///
/// The serialized block itself lives in the block log; the metadata
/// carries the pointers into the logs plus the chain facts (height and
/// cumulative work) that reorg decisions need without touching the log.
#[derive(Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct BlockMetadata {
    pub header: Header,
    pub height: Height,
    /// Total work from genesis through this block.
    pub cum_work: Work,
    pub block_ptr: LogPointer,
    pub revert_ptr: LogPointer,
    pub tx_count: u32,
    pub status: BlockStatus,
}

impl BlockMetadata {
    pub fn hash(&self) -> block::Hash {
        self.header.hash()
    }

    pub fn is_on_main_chain(&self) -> bool {
        self.status.contains(BlockStatus::ON_MAIN_CHAIN)
    }
}

/// Where a confirmed transaction lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct TransactionLocation {
    pub block_hash: block::Hash,
    pub height: Height,
    /// The transaction's position in its block, coinbase = 0.
    pub index: u32,
    /// The containing block's timestamp.
    pub timestamp: u64,
}

/// An unspent transaction output together with the context its
/// spendability rules need.
#[derive(Clone, Debug, Eq, PartialEq, Hash, TbSerialize, TbDeserialize)]
pub struct Utxo {
    pub outpoint: transparent::OutPoint,
    pub output: transparent::Output,
    /// The height of the block that created this output.
    pub height: Height,
    /// The creating transaction's version.
    pub version: u32,
    /// Whether this output was created by a coinbase transaction, and
    /// so is subject to the maturity rule.
    pub from_coinbase: bool,
}

impl Utxo {
    /// The address index key owner, when the lock kind has one.
    pub fn address_hash(&self) -> Option<transparent::AddressHash> {
        self.output.address_hash()
    }
}

/// The UTXOs a block consumed, written next to the block so the block
/// can be disconnected exactly.
///
/// Order matters: entries appear in block order (transaction by
/// transaction, input by input), and disconnect replays them in
/// reverse.
#[derive(Clone, Debug, Default, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct RevertRecord {
    pub spent: Vec<Utxo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_chain::ThunderboltDeserializeInto;

    #[test]
    fn block_status_roundtrip() {
        let status = BlockStatus::VALID | BlockStatus::ON_MAIN_CHAIN;
        let bytes = status.thunderbolt_serialize_to_vec().unwrap();
        let parsed: BlockStatus = bytes.as_slice().thunderbolt_deserialize_into().unwrap();
        assert_eq!(status, parsed);

        assert!(BlockStatus::from_bits(0b1000_0000).is_none());
    }
}
