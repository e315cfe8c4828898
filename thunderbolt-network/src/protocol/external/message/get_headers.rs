use thunderbolt_chain::{
    block, SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};

/// A `getheaders` payload: the same locator shape as `getblocks`, but
/// the responder answers with headers (up to 2000) instead of an `inv`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GetHeaders {
    /// The sender's best known block hashes, newest to oldest.
    pub block_locator: Vec<block::Hash>,
    /// The last header to report; `None` for as many as allowed.
    pub stop_hash: Option<block::Hash>,
}

impl ThunderboltDeserialize for GetHeaders {
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
        Ok(GetHeaders {
            block_locator,
            stop_hash,
        })
    }
}

impl ThunderboltSerialize for GetHeaders {
    fn thunderbolt_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.block_locator.thunderbolt_serialize(&mut target)?;
        match self.stop_hash {
            Some(hash) => hash.thunderbolt_serialize(&mut target),
            None => [0u8; 32].thunderbolt_serialize(&mut target),
        }
    }
}
