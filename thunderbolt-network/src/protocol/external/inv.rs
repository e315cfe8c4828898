//! Inventory items for the peer-to-peer protocol.

use std::io::{Read, Write};

use thunderbolt_chain::{
    block,
    serialization::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize},
    transaction,
};

/// An inventory hash which refers to some advertised or requested data.
///
/// The protocol calls this an "inventory vector" but it is just a typed
/// hash, not a container, so we do not use that term to avoid confusion
/// with `Vec<T>`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// A hash of a transaction.
    Tx(transaction::Hash),
    /// A hash of a block.
    Block(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(tx: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(tx)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

impl ThunderboltSerialize for InventoryHash {
    fn thunderbolt_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        let (code, bytes) = match *self {
            InventoryHash::Tx(hash) => (1u32, hash.0),
            InventoryHash::Block(hash) => (2u32, hash.0),
        };
        code.thunderbolt_serialize(&mut writer)?;
        bytes.thunderbolt_serialize(&mut writer)?;
        Ok(())
    }
}

impl ThunderboltDeserialize for InventoryHash {
    fn thunderbolt_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u32::thunderbolt_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::thunderbolt_deserialize(&mut reader)?;
        match code {
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_chain::ThunderboltDeserializeInto;

    #[test]
    fn inventory_roundtrip() {
        for item in &[
            InventoryHash::Tx(transaction::Hash([1u8; 32])),
            InventoryHash::Block(block::Hash([2u8; 32])),
        ] {
            let bytes = item.thunderbolt_serialize_to_vec().unwrap();
            let parsed: InventoryHash = bytes.as_slice().thunderbolt_deserialize_into().unwrap();
            assert_eq!(*item, parsed);
        }
    }

    #[test]
    fn unknown_inventory_code_is_rejected() {
        let mut bytes = Vec::new();
        3u32.thunderbolt_serialize(&mut bytes).unwrap();
        [0u8; 32].thunderbolt_serialize(&mut bytes).unwrap();
        assert!(bytes
            .as_slice()
            .thunderbolt_deserialize_into::<InventoryHash>()
            .is_err());
    }
}
