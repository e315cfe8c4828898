//! Transactions and transaction-related structures.

mod hash;
mod serialize;

pub mod sighash;

#[cfg(test)]
pub(crate) mod tests;

pub use hash::Hash;
pub use serialize::MAX_TX_SIZE;

use crate::cached::Cached;
use crate::ThunderboltSerialize;
use thunderbolt_serde_derive::TbSerialize;

use crate::transparent;

/// A transaction: an ordered list of inputs consuming previous outputs,
/// and an ordered list of newly locked outputs.
///
/// Everything is designed to ensure that transactions can be created,
/// propagated on the network, validated, and finally added to the
/// global ledger of transactions (the blockchain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TbSerialize)]
pub struct Transaction {
    /// The transaction format version.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// Earliest time the transaction may be mined. Carried on the wire
    /// but not consulted by any validation rule.
    pub lock_time: u64,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        lock_time: u64,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        }
    }

    /// Get the id of this transaction.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate and return the hash
        Hash::from(self)
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    /// Returns the serialized length (in bytes) of this transaction.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4;
        for input in self.inputs.iter() {
            size += input.serialized_size();
        }
        size += 4;
        for output in self.outputs.iter() {
            size += output.serialized_size();
        }
        size + 8
    }
}
