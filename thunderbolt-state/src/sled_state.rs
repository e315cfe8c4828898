//! The primary implementation of chain persistence, built upon sled.
//!
//! Everything the index knows lives in one sled tree under prefixed
//! keys:
//!
//! - `B:<block_hash>` — [`BlockMetadata`]
//! - `C:<height be>` — the active chain's block hash at a height
//! - `T:<tx_id>` — [`TransactionLocation`]
//! - `U:<outpoint>` — [`Utxo`]
//! - `A:<address_hash><outpoint>` — per-address UTXO index (presence)
//! - `H` — the chain head block hash
//!
//! Keeping one tree means one [`sled::Batch`] publishes a block's whole
//! effect atomically: metadata, main-chain index, transaction
//! locations, UTXO changes, and the head move land together or not at
//! all. The serialized blocks themselves live in the segmented logs;
//! only pointers go through sled.

use std::sync::Arc;

use tracing::trace;

use thunderbolt_chain::{
    block::{self, Block, Height},
    parameters::Network,
    transaction, transparent,
    ThunderboltDeserialize, ThunderboltSerialize,
};

use crate::{
    util, BlockMetadata, Config, LogPointer, RevertRecord, SegmentedLog, StorageError,
    TransactionLocation, Utxo,
};

const HEAD_KEY: &[u8] = b"H";

fn block_key(hash: &block::Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(b"B:");
    key.extend_from_slice(&hash.0);
    key
}

fn height_key(height: Height) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.extend_from_slice(b"C:");
    // Big-endian so the keys sort by height.
    key.extend_from_slice(&height.0.to_be_bytes());
    key
}

fn tx_key(hash: &transaction::Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(b"T:");
    key.extend_from_slice(&hash.0);
    key
}

fn utxo_key(outpoint: &transparent::OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(38);
    key.extend_from_slice(b"U:");
    key.extend_from_slice(&outpoint.tx_id.0);
    key.extend_from_slice(&outpoint.index.to_le_bytes());
    key
}

fn address_key(address: &transparent::AddressHash, outpoint: &transparent::OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(58);
    key.extend_from_slice(b"A:");
    key.extend_from_slice(&address.0);
    key.extend_from_slice(&outpoint.tx_id.0);
    key.extend_from_slice(&outpoint.index.to_le_bytes());
    key
}

fn serialize<T: ThunderboltSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    value.thunderbolt_serialize_to_vec().map_err(StorageError::Io)
}

fn deserialize<T: ThunderboltDeserialize>(bytes: sled::IVec) -> Result<T, StorageError> {
    Ok(T::thunderbolt_deserialize(bytes.as_ref())?)
}

/// A staged set of index mutations that must land atomically.
///
/// The chain engine computes one of these per connect, disconnect, or
/// whole reorg, then hands it to [`FinalizedState::apply`]. Nothing is
/// visible to readers until `apply` returns.
#[derive(Debug, Default)]
pub struct ChainWrite {
    /// The new chain head, if this write moves it.
    pub head: Option<block::Hash>,
    /// Metadata records to insert or overwrite (status changes included).
    pub metadata: Vec<BlockMetadata>,
    /// Heights to remove from the active-chain index.
    pub main_chain_remove: Vec<Height>,
    /// Active-chain index entries to set.
    pub main_chain_insert: Vec<(Height, block::Hash)>,
    /// Transaction locations to remove (disconnected blocks).
    pub tx_remove: Vec<transaction::Hash>,
    /// Transaction locations to insert.
    pub tx_insert: Vec<(transaction::Hash, TransactionLocation)>,
    /// UTXOs consumed by the write.
    pub utxo_remove: Vec<Utxo>,
    /// UTXOs created by the write.
    pub utxo_insert: Vec<Utxo>,
}

impl ChainWrite {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
            && self.metadata.is_empty()
            && self.main_chain_remove.is_empty()
            && self.main_chain_insert.is_empty()
            && self.tx_remove.is_empty()
            && self.tx_insert.is_empty()
            && self.utxo_remove.is_empty()
            && self.utxo_insert.is_empty()
    }
}

/// The persisted chain state: the metadata index plus the block and
/// revert logs.
///
/// This structure has two categories of methods: *reads*, which take
/// `&self` and see the last applied write, and *writes*
/// ([`FinalizedState::append_block`], [`FinalizedState::append_revert`],
/// [`FinalizedState::apply`]), which take `&mut self` and are only ever
/// called by the single chain-mutation owner.
pub struct FinalizedState {
    index: sled::Tree,
    blocks: SegmentedLog,
    reverts: SegmentedLog,
    network: Network,
}

impl FinalizedState {
    pub fn new(config: &Config, network: Network) -> Result<Self, StorageError> {
        let db = config.sled_config(network).open()?;
        let index = db.open_tree(b"index")?;

        let blocks = SegmentedLog::open(&config.block_log_dir(network), config.segment_bytes)?;
        let reverts = SegmentedLog::open(&config.revert_log_dir(network), config.segment_bytes)?;

        Ok(Self {
            index,
            blocks,
            reverts,
            network,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Returns the hash of the current chain head, if one has been set.
    pub fn head_hash(&self) -> Result<Option<block::Hash>, StorageError> {
        match self.index.get(HEAD_KEY)? {
            Some(bytes) => Ok(Some(deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the metadata of the current chain head.
    pub fn head(&self) -> Result<Option<BlockMetadata>, StorageError> {
        match self.head_hash()? {
            Some(hash) => {
                let meta = self
                    .metadata(&hash)?
                    .ok_or(StorageError::Missing("chain head metadata"))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    pub fn metadata(&self, hash: &block::Hash) -> Result<Option<BlockMetadata>, StorageError> {
        match self.index.get(block_key(hash))? {
            Some(bytes) => Ok(Some(deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &block::Hash) -> Result<bool, StorageError> {
        Ok(self.index.contains_key(block_key(hash))?)
    }

    /// Append a serialized block to the block log.
    pub fn append_block(&mut self, block: &Block) -> Result<LogPointer, StorageError> {
        self.blocks.append_value(block)
    }

    /// Append a revert record to the revert log.
    pub fn append_revert(&mut self, revert: &RevertRecord) -> Result<LogPointer, StorageError> {
        self.reverts.append_value(revert)
    }

    /// Read a block back through its metadata pointer.
    pub fn block(&self, hash: &block::Hash) -> Result<Option<Arc<Block>>, StorageError> {
        let meta = match self.metadata(hash)? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let block: Block = self.blocks.read_value(meta.block_ptr)?;
        Ok(Some(Arc::new(block)))
    }

    /// Read a block's revert record back through its metadata pointer.
    pub fn revert_record(&self, hash: &block::Hash) -> Result<Option<RevertRecord>, StorageError> {
        let meta = match self.metadata(hash)? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        Ok(Some(self.reverts.read_value(meta.revert_ptr)?))
    }

    /// The active chain's block hash at `height`.
    pub fn main_chain_hash(&self, height: Height) -> Result<Option<block::Hash>, StorageError> {
        match self.index.get(height_key(height))? {
            Some(bytes) => Ok(Some(deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` active-chain hashes starting at `start` (inclusive),
    /// in height order.
    pub fn main_chain_range(
        &self,
        start: Height,
        limit: usize,
    ) -> Result<Vec<block::Hash>, StorageError> {
        let mut hashes = Vec::new();
        for entry in self.index.range(height_key(start)..height_key(Height(u64::MAX))) {
            let (_, value) = entry?;
            hashes.push(deserialize(value)?);
            if hashes.len() >= limit {
                break;
            }
        }
        Ok(hashes)
    }

    pub fn transaction_location(
        &self,
        hash: &transaction::Hash,
    ) -> Result<Option<TransactionLocation>, StorageError> {
        match self.index.get(tx_key(hash))? {
            Some(bytes) => Ok(Some(deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up a confirmed transaction through its location record.
    pub fn transaction(
        &self,
        hash: &transaction::Hash,
    ) -> Result<Option<Arc<transaction::Transaction>>, StorageError> {
        let location = match self.transaction_location(hash)? {
            Some(location) => location,
            None => return Ok(None),
        };
        let block = self
            .block(&location.block_hash)?
            .ok_or(StorageError::Missing("block for indexed transaction"))?;
        let tx = block
            .transactions
            .get(location.index as usize)
            .ok_or(StorageError::Missing("transaction at indexed position"))?
            .clone();
        Ok(Some(tx))
    }

    /// `get(tx_id, index)` over the UTXO set.
    pub fn utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, StorageError> {
        match self.index.get(utxo_key(outpoint))? {
            Some(bytes) => Ok(Some(deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Every UTXO paying the given address hash, as a snapshot.
    pub fn utxos_by_address(
        &self,
        address: &transparent::AddressHash,
    ) -> Result<Vec<Utxo>, StorageError> {
        let mut prefix = Vec::with_capacity(22);
        prefix.extend_from_slice(b"A:");
        prefix.extend_from_slice(&address.0);

        let mut utxos = Vec::new();
        for entry in self.index.scan_prefix(&prefix) {
            let (key, _) = entry?;
            // The outpoint is the key suffix after "A:" and the hash.
            let outpoint_bytes = &key[22..];
            let outpoint = transparent::OutPoint::thunderbolt_deserialize(outpoint_suffix(
                outpoint_bytes,
            )?)?;
            if let Some(utxo) = self.utxo(&outpoint)? {
                utxos.push(utxo);
            }
        }
        Ok(utxos)
    }

    /// Iterate over every UTXO in the set.
    pub fn utxo_iter(
        &self,
    ) -> impl Iterator<Item = Result<Utxo, StorageError>> + '_ {
        self.index.scan_prefix(b"U:").map(|entry| {
            let (_, value) = entry?;
            deserialize(value)
        })
    }

    /// A locator for the active chain: dense near the head, sparse
    /// toward genesis.
    pub fn block_locator(&self) -> Result<Vec<block::Hash>, StorageError> {
        let head = match self.head()? {
            Some(head) => head,
            None => return Ok(Vec::new()),
        };

        let heights = util::block_locator_heights(head.height);
        let mut hashes = Vec::with_capacity(heights.len());

        for height in heights {
            if let Some(hash) = self.main_chain_hash(height)? {
                hashes.push(hash);
            }
        }

        Ok(hashes)
    }

    /// Atomically apply a staged write.
    ///
    /// UTXO inserts are idempotent for identical records and rejected
    /// for conflicting records under the same outpoint; since this
    /// method is only called by the single chain-mutation owner, the
    /// pre-check cannot race the batch.
    pub fn apply(&mut self, write: ChainWrite) -> Result<(), StorageError> {
        for utxo in &write.utxo_insert {
            if let Some(existing) = self.utxo(&utxo.outpoint)? {
                if existing != *utxo {
                    return Err(StorageError::Transaction(format!(
                        "conflicting utxo record for {:?}",
                        utxo.outpoint
                    )));
                }
            }
        }

        let mut batch = sled::Batch::default();

        for meta in &write.metadata {
            batch.insert(block_key(&meta.hash()), serialize(meta)?);
        }
        for height in &write.main_chain_remove {
            batch.remove(height_key(*height));
        }
        for (height, hash) in &write.main_chain_insert {
            batch.insert(height_key(*height), serialize(hash)?);
        }
        for hash in &write.tx_remove {
            batch.remove(tx_key(hash));
        }
        for (hash, location) in &write.tx_insert {
            batch.insert(tx_key(hash), serialize(location)?);
        }
        for utxo in &write.utxo_remove {
            batch.remove(utxo_key(&utxo.outpoint));
            if let Some(address) = utxo.address_hash() {
                batch.remove(address_key(&address, &utxo.outpoint));
            }
        }
        for utxo in &write.utxo_insert {
            batch.insert(utxo_key(&utxo.outpoint), serialize(utxo)?);
            if let Some(address) = utxo.address_hash() {
                batch.insert(address_key(&address, &utxo.outpoint), &[][..]);
            }
        }
        if let Some(head) = &write.head {
            batch.insert(HEAD_KEY, serialize(head)?);
        }

        self.index.apply_batch(batch)?;
        self.index.flush()?;

        trace!(head = ?write.head, "applied chain write");
        Ok(())
    }
}

fn outpoint_suffix(bytes: &[u8]) -> Result<&[u8], StorageError> {
    if bytes.len() != transparent::OutPoint::len() {
        return Err(StorageError::Missing("well-formed address index key"));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    use thunderbolt_chain::{
        amount::Amount,
        block::{merkle, Header},
        parameters,
        transparent::{LockScript, OutPoint, Output},
        work::difficulty::CompactDifficulty,
    };

    use crate::BlockStatus;

    fn test_state() -> (tempfile::TempDir, FinalizedState) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_dir: dir.path().to_path_buf(),
            segment_bytes: 1024 * 1024,
        };
        let state = FinalizedState::new(&config, parameters::Network::Testnet).unwrap();
        (dir, state)
    }

    fn test_header(parent: block::Hash, nonce: u64) -> Header {
        Header::new(
            1,
            parent,
            merkle::Root([0u8; 32]),
            600,
            CompactDifficulty(0x2007_ffff),
            nonce,
        )
    }

    fn test_utxo(tx_byte: u8, index: u32, from_coinbase: bool) -> Utxo {
        Utxo {
            outpoint: OutPoint {
                tx_id: transaction::Hash([tx_byte; 32]),
                index,
            },
            output: Output {
                value: Amount::try_from(1000i64).unwrap(),
                lock_script: LockScript::single_sig(vec![tx_byte; 33]),
            },
            height: Height(1),
            version: 1,
            from_coinbase,
        }
    }

    #[test]
    fn metadata_and_head_roundtrip() {
        thunderbolt_test::init();
        let (_dir, mut state) = test_state();

        let header = test_header(block::Hash([0u8; 32]), 7);
        let meta = BlockMetadata {
            header,
            height: Height(0),
            cum_work: Default::default(),
            block_ptr: LogPointer::default(),
            revert_ptr: LogPointer::default(),
            tx_count: 1,
            status: BlockStatus::VALID | BlockStatus::ON_MAIN_CHAIN,
        };

        let mut write = ChainWrite::default();
        write.metadata.push(meta.clone());
        write.main_chain_insert.push((Height(0), meta.hash()));
        write.head = Some(meta.hash());
        state.apply(write).unwrap();

        assert_eq!(state.head_hash().unwrap(), Some(meta.hash()));
        assert_eq!(state.metadata(&meta.hash()).unwrap(), Some(meta.clone()));
        assert_eq!(
            state.main_chain_hash(Height(0)).unwrap(),
            Some(meta.hash())
        );
    }

    #[test]
    fn utxo_insert_lookup_and_address_index() {
        thunderbolt_test::init();
        let (_dir, mut state) = test_state();

        let utxo = test_utxo(3, 0, false);
        let address = utxo.address_hash().unwrap();

        let mut write = ChainWrite::default();
        write.utxo_insert.push(utxo.clone());
        state.apply(write).unwrap();

        assert_eq!(state.utxo(&utxo.outpoint).unwrap(), Some(utxo.clone()));
        assert_eq!(state.utxos_by_address(&address).unwrap(), vec![utxo.clone()]);

        // Spending it clears both indexes.
        let mut write = ChainWrite::default();
        write.utxo_remove.push(utxo.clone());
        state.apply(write).unwrap();

        assert_eq!(state.utxo(&utxo.outpoint).unwrap(), None);
        assert!(state.utxos_by_address(&address).unwrap().is_empty());
    }

    #[test]
    fn utxo_iter_walks_the_whole_set() {
        thunderbolt_test::init();
        let (_dir, mut state) = test_state();

        let mut write = ChainWrite::default();
        for tx_byte in 1..=3u8 {
            write.utxo_insert.push(test_utxo(tx_byte, 0, false));
        }
        state.apply(write).unwrap();

        let mut utxos: Vec<Utxo> = state.utxo_iter().map(|utxo| utxo.unwrap()).collect();
        utxos.sort_by_key(|utxo| utxo.outpoint.tx_id.0);
        assert_eq!(utxos.len(), 3);
        assert_eq!(utxos[0].outpoint.tx_id.0, [1u8; 32]);
        assert_eq!(utxos[2].outpoint.tx_id.0, [3u8; 32]);
    }

    #[test]
    fn conflicting_utxo_insert_is_rejected() {
        thunderbolt_test::init();
        let (_dir, mut state) = test_state();

        let utxo = test_utxo(4, 0, false);
        let mut write = ChainWrite::default();
        write.utxo_insert.push(utxo.clone());
        state.apply(write).unwrap();

        // Identical insert is idempotent.
        let mut write = ChainWrite::default();
        write.utxo_insert.push(utxo.clone());
        state.apply(write).unwrap();

        // A different record under the same outpoint is a storage error.
        let mut conflicting = utxo;
        conflicting.height = Height(9);
        let mut write = ChainWrite::default();
        write.utxo_insert.push(conflicting);
        assert!(matches!(
            state.apply(write),
            Err(StorageError::Transaction(_))
        ));
    }

    #[test]
    fn blocks_roundtrip_through_the_log() {
        thunderbolt_test::init();
        let (_dir, mut state) = test_state();

        let genesis = parameters::genesis_block(parameters::Network::Testnet);
        let block_ptr = state.append_block(&genesis).unwrap();
        let revert_ptr = state.append_revert(&RevertRecord::default()).unwrap();

        let meta = BlockMetadata {
            header: genesis.header,
            height: Height(0),
            cum_work: Default::default(),
            block_ptr,
            revert_ptr,
            tx_count: genesis.transactions.len() as u32,
            status: BlockStatus::VALID | BlockStatus::ON_MAIN_CHAIN,
        };
        let mut write = ChainWrite::default();
        write.metadata.push(meta);
        state.apply(write).unwrap();

        let read_back = state.block(&genesis.hash()).unwrap().unwrap();
        assert_eq!(read_back, genesis);
        assert_eq!(
            state.revert_record(&genesis.hash()).unwrap(),
            Some(RevertRecord::default())
        );
    }
}
