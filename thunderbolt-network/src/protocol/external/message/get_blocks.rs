use thunderbolt_chain::{
    block, SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};

/// A `getblocks` payload: a block locator plus an optional stop hash.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GetBlocks {
    /// The sender's best known block hashes, ordered newest to oldest,
    /// dense near the tip and exponentially sparser toward genesis.
    pub block_locator: Vec<block::Hash>,
    /// The last block to report. `None` (all zeroes on the wire) asks
    /// for as many as the responder will send (up to 500).
    pub stop_hash: Option<block::Hash>,
}

impl ThunderboltDeserialize for GetBlocks {
    fn thunderbolt_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        let block_locator = Vec::thunderbolt_deserialize(&mut reader)?;
        let raw_stop_hash = block::Hash::thunderbolt_deserialize(&mut reader)?;
        let stop_hash = if raw_stop_hash.0 == [0u8; 32] {
            None
        } else {
            Some(raw_stop_hash)
        };
        Ok(GetBlocks {
            block_locator,
            stop_hash,
        })
    }
}

impl ThunderboltSerialize for GetBlocks {
    fn thunderbolt_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.block_locator.thunderbolt_serialize(&mut target)?;
        match self.stop_hash {
            Some(hash) => hash.thunderbolt_serialize(&mut target),
            None => [0u8; 32].thunderbolt_serialize(&mut target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_chain::ThunderboltDeserializeInto;

    #[test]
    fn getblocks_roundtrip_with_and_without_stop() {
        for stop_hash in &[None, Some(block::Hash([9u8; 32]))] {
            let msg = GetBlocks {
                block_locator: vec![block::Hash([1u8; 32]), block::Hash([2u8; 32])],
                stop_hash: *stop_hash,
            };
            let bytes = msg.thunderbolt_serialize_to_vec().unwrap();
            let parsed: GetBlocks = bytes.as_slice().thunderbolt_deserialize_into().unwrap();
            assert_eq!(msg, parsed);
        }
    }
}
