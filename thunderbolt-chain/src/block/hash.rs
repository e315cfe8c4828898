use std::{fmt, io};

use crate::serialization::{sha256d, SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use thunderbolt_serde_derive::TbSerialize;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use super::Header;

/// A hash of a block, used to identify blocks and link blocks into a chain. ⛓️
///
/// Technically, this is the sha256d hash of a block *header*, but since the
/// header includes the merkle root of the transaction merkle tree, it binds
/// the entire contents of the block.
///
/// The digest bytes are stored here in the big-endian display order used
/// everywhere blocks are named: the raw sha256d output is reversed once,
/// when the hash is computed, and never again.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, TbSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn from_bytes_exact(bytes: [u8; 32]) -> Hash {
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("block::Hash")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl ThunderboltDeserialize for Hash {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        Ok(Hash(<[u8; 32]>::thunderbolt_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Header> for Hash {
    fn from(block_header: &'a Header) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        block_header
            .thunderbolt_serialize(&mut hash_writer)
            .expect("Sha256dWriter is infallible");
        let mut bytes = hash_writer.finish();
        bytes.reverse();
        Self(bytes)
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            Ok(Hash(bytes))
        }
    }
}
