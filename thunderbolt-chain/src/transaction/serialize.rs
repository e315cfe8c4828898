//! Contains the `ThunderboltDeserialize` impl for transactions, so that
//! deserialization can stamp the tx id cache in one place.

use std::io::Read;

use crate::serialization::{SerializationError, ThunderboltDeserialize};

use super::*;
use crate::cached::Cached;
use crate::transparent;

/// The maximum size of a serialized transaction, in bytes.
pub const MAX_TX_SIZE: u64 = 100_000;

/// Deserializes a transaction, calculating and caching its id.
impl ThunderboltDeserialize for Transaction {
    fn thunderbolt_deserialize<R: Read>(src: R) -> Result<Self, SerializationError> {
        // Bound the read up front to protect against DOS attacks.
        let mut src = src.take(MAX_TX_SIZE);

        let version = u32::thunderbolt_deserialize(&mut src)?;
        let inputs = <Vec<transparent::Input>>::thunderbolt_deserialize(&mut src)?;
        let outputs = <Vec<transparent::Output>>::thunderbolt_deserialize(&mut src)?;
        let lock_time = u64::thunderbolt_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        };
        // Calculate and cache the id.
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
