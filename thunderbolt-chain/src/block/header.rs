use std::io::{self, Read};

use crate::{
    serialization::sha256d, Cached, SerializationError, ThunderboltDeserialize,
    ThunderboltSerialize,
};
use thunderbolt_serde_derive::TbSerialize;

use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// How are blocks chained together? They are chained together via the
/// backwards reference (parent hash) present in the block header. Each
/// block points backwards to its parent, all the way back to the
/// genesis block (the first block in the blockchain).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, TbSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks
    /// back to the genesis block. The zero hash marks genesis itself.
    pub parent_hash: Hash,

    /// The root of the transaction merkle tree, binding the block
    /// header to the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp as Unix epoch seconds (UTC), claimed by the
    /// miner at the time it started hashing the header.
    pub timestamp: u64,

    /// An encoded version of the target threshold this block's header
    /// hash must be less than or equal to.
    ///
    /// For a block at height `height`, bits MUST equal the retarget
    /// schedule's expected value at that height.
    pub bits: CompactDifficulty,

    /// An arbitrary field that miners change to modify the header hash
    /// in order to produce a hash less than or equal to the target.
    pub nonce: u64,

    /// For efficiency, we cache the hash of this block after computing it the first time.
    /// This field is not part of the consensus serialization.
    hash: Cached<Hash>,
}

impl Header {
    /// Returns length of a serialized header in bytes
    pub const fn len() -> usize {
        88
    }

    pub fn new(
        version: u32,
        parent_hash: Hash,
        merkle_root: merkle::Root,
        timestamp: u64,
        bits: CompactDifficulty,
        nonce: u64,
    ) -> Header {
        Header {
            version,
            parent_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            hash: Cached::new(),
        }
    }

    /// The hash of this header, from the cache when one was stamped at
    /// deserialization time.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// A copy of this header with a different nonce and an empty hash
    /// cache. Used by miners and test chains grinding for a valid hash.
    pub fn with_nonce(&self, nonce: u64) -> Header {
        Header {
            nonce,
            hash: Cached::new(),
            ..*self
        }
    }
}

impl ThunderboltDeserialize for Header {
    /// Deserializes a header, hashing the raw bytes once so the hash
    /// never has to be recomputed from a re-serialization.
    fn thunderbolt_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 88];
        reader.read_exact(&mut raw)?;

        let mut digest = sha256d::digest(&raw);
        digest.reverse();
        let own_hash = Hash(digest);

        let mut src = io::Cursor::new(&raw[..]);
        Ok(Header {
            version: u32::thunderbolt_deserialize(&mut src)?,
            parent_hash: Hash::thunderbolt_deserialize(&mut src)?,
            merkle_root: merkle::Root::thunderbolt_deserialize(&mut src)?,
            timestamp: u64::thunderbolt_deserialize(&mut src)?,
            bits: CompactDifficulty::thunderbolt_deserialize(&mut src)?,
            nonce: u64::thunderbolt_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}

/// A header with a count of the number of transactions in its block.
///
/// This structure is used in the `headers` network message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedHeader {
    pub header: Header,
    pub transaction_count: u32,
}
