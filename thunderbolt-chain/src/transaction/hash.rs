use std::{fmt, io};

use crate::serialization::{sha256d, SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use thunderbolt_serde_derive::TbSerialize;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use super::Transaction;

/// A transaction id: the sha256d hash of the serialized transaction, in
/// big-endian display byte order like [`crate::block::Hash`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, TbSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The zero hash: the sentinel "no transaction" used by coinbase inputs.
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl ThunderboltDeserialize for Hash {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::thunderbolt_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Transaction> for Hash {
    fn from(transaction: &'a Transaction) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        transaction
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
