//! The binary hash tree binding a block header to its transactions.

use std::{fmt, io, iter::FromIterator};

use crate::serialization::{sha256d, SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use crate::transaction;
use thunderbolt_serde_derive::TbSerialize;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The root of the merkle tree over a block's transaction hashes.
///
/// Levels are built by pairwise sha256d over the concatenated child
/// hashes; a level with an odd count duplicates its last hash. The root
/// of a single transaction is that transaction's hash unchanged.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, TbSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl ThunderboltDeserialize for Root {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::thunderbolt_deserialize(&mut reader)?))
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    sha256d::digest(&data)
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();

        if level.is_empty() {
            return Root([0u8; 32]);
        }

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = *level.last().expect("level is non-empty");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }

        Root(level[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_root_is_its_hash() {
        let hash = transaction::Hash([7u8; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_level_duplicates_last_hash() {
        let a = transaction::Hash([1u8; 32]);
        let b = transaction::Hash([2u8; 32]);
        let c = transaction::Hash([3u8; 32]);

        let root: Root = vec![a, b, c].into_iter().collect();

        let ab = hash_pair(&a.0, &b.0);
        let cc = hash_pair(&c.0, &c.0);
        let expected = hash_pair(&ab, &cc);

        assert_eq!(root.0, expected);
    }
}
