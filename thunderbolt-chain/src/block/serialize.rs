//! Wire and disk serialization for blocks.

use std::io::Read;
use std::sync::Arc;

use crate::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

use super::{Block, CountedHeader, Header};
use crate::transaction::Transaction;

/// The maximum size of a serialized block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 1_000_000;

/// A lower bound on the size of a serialized transaction: version,
/// input count, one coinbase-sized input, output count, lock time.
const MIN_TX_BYTES: u64 = 60;

impl ThunderboltDeserialize for Block {
    fn thunderbolt_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        let mut src = reader.take(MAX_BLOCK_BYTES);

        let header = Header::thunderbolt_deserialize(&mut src)?;

        let tx_count = u32::thunderbolt_deserialize(&mut src)? as u64;
        // Sanity check the claimed count before allocating for it.
        if tx_count > MAX_BLOCK_BYTES / MIN_TX_BYTES {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit in a block",
            ));
        }

        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::thunderbolt_deserialize(&mut src)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}

impl ThunderboltSerialize for CountedHeader {
    fn thunderbolt_serialize<W: std::io::Write>(
        &self,
        mut target: W,
    ) -> Result<(), std::io::Error> {
        self.header.thunderbolt_serialize(&mut target)?;
        self.transaction_count.thunderbolt_serialize(&mut target)
    }
}

impl ThunderboltDeserialize for CountedHeader {
    fn thunderbolt_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CountedHeader {
            header: Header::thunderbolt_deserialize(&mut reader)?,
            transaction_count: u32::thunderbolt_deserialize(&mut reader)?,
        })
    }
}
