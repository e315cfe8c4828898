//! The chain state machine: accept, commit, and reorganize.
//!
//! One [`ChainEngine`] owns the tip, the persistent state, and the
//! mempool. Every mutation funnels through [`ChainEngine::accept`] (or
//! the transaction path), so consistency reasoning is local to this
//! file: stage everything in memory first, validate against the staged
//! view, then publish with one atomic state write. A failure anywhere
//! before the write leaves the tip untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use thunderbolt_chain::{
    amount::{Amount, NonNegative},
    block::{self, Block, CountedHeader, Height},
    parameters::{genesis_block, Network},
    transaction::{self, Transaction},
    transparent,
    work::difficulty::{CompactDifficulty, Work},
};
use thunderbolt_state::{
    BlockMetadata, BlockStatus, ChainWrite, FinalizedState, LogPointer, RevertRecord,
    StorageError, TransactionLocation, Utxo,
};

use crate::block::check as block_check;
use crate::difficulty;
use crate::error::{BlockError, CheckError, TransactionError};
use crate::mempool::{Mempool, MempoolInsertOutcome};
use crate::transaction::check as tx_check;

/// Read access to the UTXO set, possibly through pending changes.
pub trait UtxoView {
    fn utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, StorageError>;
}

impl UtxoView for FinalizedState {
    fn utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, StorageError> {
        FinalizedState::utxo(self, outpoint)
    }
}

/// Staged UTXO changes that have not been published yet.
///
/// During a commit or a whole reorg the engine accumulates every create
/// and spend here, reading "through" the delta so later transactions
/// see the effects of earlier ones. Creating a record that was just
/// staged as spent (or vice versa) cancels instead of accumulating, so
/// a reorg that replays the same transaction on the new branch nets out
/// to nothing.
#[derive(Debug, Default)]
pub struct ChainDelta {
    created: HashMap<transparent::OutPoint, Utxo>,
    spent: HashMap<transparent::OutPoint, Utxo>,
}

impl ChainDelta {
    fn create(&mut self, utxo: Utxo) {
        if let Some(prev) = self.spent.get(&utxo.outpoint) {
            if *prev == utxo {
                self.spent.remove(&utxo.outpoint);
                return;
            }
        }
        self.created.insert(utxo.outpoint, utxo);
    }

    fn spend(&mut self, utxo: Utxo) {
        if self.created.remove(&utxo.outpoint).is_some() {
            return;
        }
        self.spent.insert(utxo.outpoint, utxo);
    }

    fn into_write(self) -> ChainWrite {
        ChainWrite {
            utxo_insert: self.created.into_iter().map(|(_, utxo)| utxo).collect(),
            utxo_remove: self.spent.into_iter().map(|(_, utxo)| utxo).collect(),
            ..ChainWrite::default()
        }
    }
}

/// A [`ChainDelta`] stacked on the finalized state.
pub struct DeltaView<'a> {
    pub base: &'a FinalizedState,
    pub delta: &'a ChainDelta,
}

impl UtxoView for DeltaView<'_> {
    fn utxo(&self, outpoint: &transparent::OutPoint) -> Result<Option<Utxo>, StorageError> {
        if let Some(utxo) = self.delta.created.get(outpoint) {
            return Ok(Some(utxo.clone()));
        }
        if self.delta.spent.contains_key(outpoint) {
            return Ok(None);
        }
        self.base.utxo(outpoint)
    }
}

/// The discriminated outcome of offering a block to the engine.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// The block is now the tip, by extension or by reorganization.
    Accepted,
    /// The block (or the tip itself) was already known; nothing changed.
    AlreadyKnown,
    /// The block's parent is unknown; the block was not stored.
    Orphan,
    /// The block was stored on a side branch with less work than the tip.
    SideChain,
    /// The block broke a rule; the sender earns ban score.
    Invalid(BlockError),
}

/// A batch of observable chain changes, delivered to listeners after
/// the state write that made them true.
#[derive(Debug, Default)]
pub struct ChainEvent {
    /// Blocks now on the active chain, in commit order.
    pub connected: Vec<(block::Hash, Height)>,
    /// Blocks no longer on the active chain, tip-first.
    pub disconnected: Vec<block::Hash>,
    pub created_utxos: Vec<Utxo>,
    pub removed_utxos: Vec<transparent::OutPoint>,
}

/// A consumer of chain change notifications (the wallet, RPC caches).
///
/// Callbacks run synchronously on the engine's thread in commit order;
/// they must not call back into the engine.
pub trait ChainListener: Send {
    fn chain_updated(&mut self, event: &ChainEvent);
}

/// What staging a block produced, besides the delta itself.
struct StagedBlock {
    revert: RevertRecord,
    tx_locations: Vec<(transaction::Hash, TransactionLocation)>,
}

enum StageError {
    Storage(StorageError),
    Invalid(BlockError),
}

impl From<CheckError> for StageError {
    fn from(e: CheckError) -> StageError {
        match e {
            CheckError::Storage(e) => StageError::Storage(e),
            CheckError::Invalid(e) => StageError::Invalid(e.into()),
        }
    }
}

impl From<BlockError> for StageError {
    fn from(e: BlockError) -> StageError {
        StageError::Invalid(e)
    }
}

/// The single chain-mutation owner.
pub struct ChainEngine {
    state: FinalizedState,
    mempool: Mempool,
    network: Network,
    tip: BlockMetadata,
    listeners: Vec<Box<dyn ChainListener>>,
}

impl ChainEngine {
    /// Open the engine over `state`, committing the genesis block if
    /// the state is empty. After this returns there is always a tip.
    pub fn new(
        mut state: FinalizedState,
        mempool: Mempool,
        network: Network,
    ) -> Result<Self, StorageError> {
        let tip = match state.head()? {
            Some(tip) => tip,
            None => Self::bootstrap_genesis(&mut state, network)?,
        };
        info!(tip = %tip.hash(), height = %tip.height, "chain engine ready");

        Ok(ChainEngine {
            state,
            mempool,
            network,
            tip,
            listeners: Vec::new(),
        })
    }

    fn bootstrap_genesis(
        state: &mut FinalizedState,
        network: Network,
    ) -> Result<BlockMetadata, StorageError> {
        let genesis = genesis_block(network);

        let block_ptr = state.append_block(&genesis)?;
        let revert_ptr = state.append_revert(&RevertRecord::default())?;

        let meta = BlockMetadata {
            header: genesis.header,
            height: Height(0),
            cum_work: block_work(&genesis.header.bits),
            block_ptr,
            revert_ptr,
            tx_count: genesis.transactions.len() as u32,
            status: BlockStatus::VALID | BlockStatus::ON_MAIN_CHAIN,
        };

        let mut write = ChainWrite::default();
        write.metadata.push(meta.clone());
        write.main_chain_insert.push((Height(0), meta.hash()));
        for (index, tx) in genesis.transactions.iter().enumerate() {
            write.tx_insert.push((
                tx.hash(),
                TransactionLocation {
                    block_hash: meta.hash(),
                    height: Height(0),
                    index: index as u32,
                    timestamp: genesis.header.timestamp,
                },
            ));
            for (i, output) in tx.outputs.iter().enumerate() {
                write.utxo_insert.push(Utxo {
                    outpoint: transparent::OutPoint {
                        tx_id: tx.hash(),
                        index: i as u32,
                    },
                    output: output.clone(),
                    height: Height(0),
                    version: tx.version,
                    from_coinbase: tx.is_coinbase(),
                });
            }
        }
        write.head = Some(meta.hash());
        state.apply(write)?;

        info!(hash = %meta.hash(), "committed genesis block");
        Ok(meta)
    }

    pub fn tip(&self) -> &BlockMetadata {
        &self.tip
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn state(&self) -> &FinalizedState {
        &self.state
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn add_listener(&mut self, listener: Box<dyn ChainListener>) {
        self.listeners.push(listener);
    }

    /// Offer a block to the chain.
    ///
    /// Storage failures abort without mutating the tip; every other
    /// outcome is a normal result reported to the caller.
    pub fn accept(&mut self, block: Arc<Block>) -> Result<AcceptOutcome, StorageError> {
        let hash = block.hash();

        // 1. Dedup against the tip and everything else we've stored.
        if hash == self.tip.hash() || self.state.contains_block(&hash)? {
            return Ok(AcceptOutcome::AlreadyKnown);
        }

        // 2. Context-free validation, including the proof of work
        //    against the block's own claimed bits.
        if let Err(e) = block_check::context_free(&block, self.network) {
            debug!(%hash, error = %e, "rejecting structurally invalid block");
            return Ok(AcceptOutcome::Invalid(e));
        }

        // 3. Resolve the parent; without it we can't place the block.
        let parent = match self.state.metadata(&block.header.parent_hash)? {
            Some(parent) => parent,
            None => {
                debug!(%hash, parent = %block.header.parent_hash, "orphan block");
                return Ok(AcceptOutcome::Orphan);
            }
        };
        let height = Height(parent.height.0 + 1);

        // 4. The bits must follow the retarget schedule on the parent's
        //    branch.
        let anchor = if difficulty::is_retarget_height(height) {
            Some(self.ancestor_header(&parent, difficulty::retarget_anchor_height(height))?)
        } else {
            None
        };
        if let Err(e) = difficulty::check_difficulty(
            self.network,
            &parent.header,
            height,
            anchor.as_ref(),
            &block.header,
        ) {
            debug!(%hash, error = %e, "rejecting block off the retarget schedule");
            return Ok(AcceptOutcome::Invalid(e));
        }

        let cum_work = parent.cum_work + block_work(&block.header.bits);

        // 5-8. Connect, store aside, or reorganize.
        if parent.hash() == self.tip.hash() {
            match self.connect_tip(block, height, cum_work)? {
                Ok(()) => Ok(AcceptOutcome::Accepted),
                Err(e) => Ok(AcceptOutcome::Invalid(e)),
            }
        } else {
            let meta = self.persist_side_chain(&block, height, cum_work)?;
            if cum_work > self.tip.cum_work {
                match self.reorganize(meta)? {
                    Ok(()) => Ok(AcceptOutcome::Accepted),
                    Err(e) => Ok(AcceptOutcome::Invalid(e)),
                }
            } else {
                debug!(%hash, height = %height, "stored side chain block");
                Ok(AcceptOutcome::SideChain)
            }
        }
    }

    /// Offer a transaction for the mempool.
    pub fn add_transaction(
        &mut self,
        tx: Arc<Transaction>,
    ) -> Result<MempoolInsertOutcome, StorageError> {
        let next_height = Height(self.tip.height.0 + 1);
        self.mempool.insert(tx, &self.state, next_height)
    }

    /// The bits required of the next block on the active chain.
    pub fn next_bits(&self) -> Result<CompactDifficulty, StorageError> {
        let height = Height(self.tip.height.0 + 1);
        let anchor = if difficulty::is_retarget_height(height) {
            Some(self.ancestor_header(&self.tip, difficulty::retarget_anchor_height(height))?)
        } else {
            None
        };
        Ok(
            difficulty::next_bits(self.network, &self.tip.header, height, anchor.as_ref())
                .expect("stored anchors carry valid difficulty encodings"),
        )
    }

    /// Walk a branch back to the header at `target_height`.
    fn ancestor_header(
        &self,
        from: &BlockMetadata,
        target_height: Height,
    ) -> Result<block::Header, StorageError> {
        let mut cursor = from.clone();
        while cursor.height > target_height {
            cursor = self
                .state
                .metadata(&cursor.header.parent_hash)?
                .ok_or(StorageError::Missing("ancestor metadata"))?;
        }
        Ok(cursor.header)
    }

    /// Hashes of active-chain blocks after the first locator match, for
    /// `getblocks` replies.
    pub fn hashes_after_locator(
        &self,
        locator: &[block::Hash],
        stop: Option<block::Hash>,
        limit: usize,
    ) -> Result<Vec<block::Hash>, StorageError> {
        let start = self.locator_fork_height(locator)?;
        let mut hashes = self
            .state
            .main_chain_range(Height(start.0 + 1), limit)?;
        if let Some(stop) = stop {
            if let Some(position) = hashes.iter().position(|hash| *hash == stop) {
                hashes.truncate(position + 1);
            }
        }
        Ok(hashes)
    }

    /// Headers of active-chain blocks after the first locator match,
    /// for `getheaders` replies.
    pub fn headers_after_locator(
        &self,
        locator: &[block::Hash],
        stop: Option<block::Hash>,
        limit: usize,
    ) -> Result<Vec<CountedHeader>, StorageError> {
        let hashes = self.hashes_after_locator(locator, stop, limit)?;
        let mut headers = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let meta = self
                .state
                .metadata(&hash)?
                .ok_or(StorageError::Missing("metadata for main chain hash"))?;
            headers.push(CountedHeader {
                header: meta.header,
                transaction_count: meta.tx_count,
            });
        }
        Ok(headers)
    }

    /// The height of the first locator entry found on the active chain,
    /// or genesis when nothing matches.
    fn locator_fork_height(&self, locator: &[block::Hash]) -> Result<Height, StorageError> {
        for hash in locator {
            if let Some(meta) = self.state.metadata(hash)? {
                if meta.is_on_main_chain() {
                    return Ok(meta.height);
                }
            }
        }
        Ok(Height(0))
    }

    /// Validate a block against `delta` and stage its effects.
    ///
    /// Reorg re-commits run through here too, so a revert that exposed
    /// a previously-masked invalidity is caught before anything is
    /// published.
    fn stage_block(
        &self,
        block: &Block,
        height: Height,
        delta: &mut ChainDelta,
    ) -> Result<StagedBlock, StageError> {
        let mut fees = Amount::<NonNegative>::zero();
        let mut revert = RevertRecord::default();
        let mut tx_locations = Vec::with_capacity(block.transactions.len());

        for (index, tx) in block.transactions.iter().enumerate() {
            if index > 0 {
                let checked = {
                    let view = DeltaView {
                        base: &self.state,
                        delta,
                    };
                    tx_check::contextual(tx, &view, height)?
                };
                for utxo in checked.spent {
                    revert.spent.push(utxo.clone());
                    delta.spend(utxo);
                }
                fees = (fees + checked.fee)
                    .map_err(|e| StageError::Invalid(TransactionError::from(e).into()))?;
            }

            for (i, output) in tx.outputs.iter().enumerate() {
                delta.create(Utxo {
                    outpoint: transparent::OutPoint {
                        tx_id: tx.hash(),
                        index: i as u32,
                    },
                    output: output.clone(),
                    height,
                    version: tx.version,
                    from_coinbase: tx.is_coinbase(),
                });
            }

            tx_locations.push((
                tx.hash(),
                TransactionLocation {
                    block_hash: block.hash(),
                    height,
                    index: index as u32,
                    timestamp: block.header.timestamp,
                },
            ));
        }

        block_check::subsidy_is_valid(block, height, fees)?;

        Ok(StagedBlock {
            revert,
            tx_locations,
        })
    }

    /// Extend the tip with `block`: the linear commit case.
    fn connect_tip(
        &mut self,
        block: Arc<Block>,
        height: Height,
        cum_work: Work,
    ) -> Result<Result<(), BlockError>, StorageError> {
        let mut delta = ChainDelta::default();
        let staged = match self.stage_block(&block, height, &mut delta) {
            Ok(staged) => staged,
            Err(StageError::Storage(e)) => return Err(e),
            Err(StageError::Invalid(e)) => {
                debug!(hash = %block.hash(), error = %e, "rejecting contextually invalid block");
                return Ok(Err(e));
            }
        };

        let block_ptr = self.state.append_block(&block)?;
        let revert_ptr = self.state.append_revert(&staged.revert)?;

        let meta = BlockMetadata {
            header: block.header,
            height,
            cum_work,
            block_ptr,
            revert_ptr,
            tx_count: block.transactions.len() as u32,
            status: BlockStatus::VALID | BlockStatus::ON_MAIN_CHAIN,
        };

        let mut write = delta.into_write();
        write.metadata.push(meta.clone());
        write.main_chain_insert.push((height, meta.hash()));
        write.tx_insert = staged.tx_locations;
        write.head = Some(meta.hash());

        let event = ChainEvent {
            connected: vec![(meta.hash(), height)],
            disconnected: Vec::new(),
            created_utxos: write.utxo_insert.clone(),
            removed_utxos: write.utxo_remove.iter().map(|u| u.outpoint).collect(),
        };

        self.state.apply(write)?;
        self.tip = meta;

        for tx in &block.transactions {
            let was_pending = self.mempool.remove(&tx.hash());
            if !was_pending && !tx.is_coinbase() {
                warn!(tx = %tx.hash(), "confirmed transaction was not in the mempool");
            }
        }

        info!(tip = %self.tip.hash(), height = %height, "extended chain");
        self.notify(&event);
        Ok(Ok(()))
    }

    /// Persist a block that doesn't connect to the tip. Its revert
    /// record is written when it first connects during a reorg.
    fn persist_side_chain(
        &mut self,
        block: &Arc<Block>,
        height: Height,
        cum_work: Work,
    ) -> Result<BlockMetadata, StorageError> {
        let block_ptr = self.state.append_block(block)?;
        let meta = BlockMetadata {
            header: block.header,
            height,
            cum_work,
            block_ptr,
            revert_ptr: LogPointer::default(),
            tx_count: block.transactions.len() as u32,
            status: BlockStatus::VALID,
        };
        let mut write = ChainWrite::default();
        write.metadata.push(meta.clone());
        self.state.apply(write)?;
        Ok(meta)
    }

    /// Switch the active chain to the branch ending at `new_tip`
    ///
    ///
    /// Everything is staged against a single delta: the old segment's
    /// reverts, then the new segment's commits, each new block passing
    /// the full contextual rule set against the post-revert view. One
    /// state write publishes the whole switch; a validation failure
    /// publishes nothing and leaves the tip unchanged.
    fn reorganize(
        &mut self,
        new_tip: BlockMetadata,
    ) -> Result<Result<(), BlockError>, StorageError> {
        // 1. Find the fork by walking the higher cursor toward its parent.
        let mut old_cursor = self.tip.clone();
        let mut new_cursor = new_tip.clone();
        let mut old_segment = Vec::new();
        let mut new_segment = Vec::new();

        while old_cursor.hash() != new_cursor.hash() {
            if old_cursor.height >= new_cursor.height {
                old_segment.push(old_cursor.clone());
                old_cursor = self.parent_of(&old_cursor)?;
            } else {
                new_segment.push(new_cursor.clone());
                new_cursor = self.parent_of(&new_cursor)?;
            }
        }
        let fork = old_cursor;
        info!(
            fork = %fork.hash(),
            disconnecting = old_segment.len(),
            connecting = new_segment.len(),
            "reorganizing"
        );

        let mut delta = ChainDelta::default();
        let mut write = ChainWrite::default();
        let mut event = ChainEvent::default();
        let mut readmit = Vec::new();

        // 2. Revert the old segment, tip-to-fork.
        for meta in &old_segment {
            let block = self
                .state
                .block(&meta.hash())?
                .ok_or(StorageError::Missing("block body for connected metadata"))?;
            let revert = self
                .state
                .revert_record(&meta.hash())?
                .ok_or(StorageError::Missing("revert record for connected block"))?;

            for tx in block.transactions.iter().rev() {
                for (i, output) in tx.outputs.iter().enumerate() {
                    delta.spend(Utxo {
                        outpoint: transparent::OutPoint {
                            tx_id: tx.hash(),
                            index: i as u32,
                        },
                        output: output.clone(),
                        height: meta.height,
                        version: tx.version,
                        from_coinbase: tx.is_coinbase(),
                    });
                }
                write.tx_remove.push(tx.hash());
                if !tx.is_coinbase() {
                    readmit.push(tx.clone());
                }
            }
            for utxo in &revert.spent {
                delta.create(utxo.clone());
            }

            let mut disconnected = meta.clone();
            disconnected.status.remove(BlockStatus::ON_MAIN_CHAIN);
            write.metadata.push(disconnected);
            write.main_chain_remove.push(meta.height);
            event.disconnected.push(meta.hash());
        }

        // 3. Re-validate and stage the new segment, fork-to-tip. Revert
        //    may have exposed an invalidity the side chain was hiding.
        let mut staged_blocks = Vec::with_capacity(new_segment.len());
        for meta in new_segment.iter().rev() {
            let block = self
                .state
                .block(&meta.hash())?
                .ok_or(StorageError::Missing("block body for side chain metadata"))?;
            match self.stage_block(&block, meta.height, &mut delta) {
                Ok(staged) => staged_blocks.push((meta.clone(), block, staged)),
                Err(StageError::Storage(e)) => return Err(e),
                Err(StageError::Invalid(e)) => {
                    warn!(
                        block = %meta.hash(),
                        error = %e,
                        "reorg abandoned: branch is invalid against the post-revert state"
                    );
                    return Ok(Err(e));
                }
            }
        }

        // 4. Write the new segment's revert records, then publish.
        let mut confirmed = Vec::new();
        let mut new_tip_meta = None;
        for (meta, block, staged) in staged_blocks {
            let revert_ptr = self.state.append_revert(&staged.revert)?;
            let mut connected = meta.clone();
            connected.revert_ptr = revert_ptr;
            connected.status.insert(BlockStatus::ON_MAIN_CHAIN);
            write.main_chain_insert.push((meta.height, meta.hash()));
            write.tx_insert.extend(staged.tx_locations);
            event.connected.push((meta.hash(), meta.height));
            for tx in &block.transactions {
                confirmed.push(tx.hash());
            }
            new_tip_meta = Some(connected.clone());
            write.metadata.push(connected);
        }
        let new_tip_meta =
            new_tip_meta.expect("a reorg always connects at least one block");

        let delta_write = delta.into_write();
        write.utxo_insert = delta_write.utxo_insert;
        write.utxo_remove = delta_write.utxo_remove;
        write.head = Some(new_tip_meta.hash());
        event.created_utxos = write.utxo_insert.clone();
        event.removed_utxos = write.utxo_remove.iter().map(|u| u.outpoint).collect();

        self.state.apply(write)?;
        self.tip = new_tip_meta;

        // 5. Settle the mempool: drop what the new branch confirmed,
        //    readmit what the old branch released (re-validated against
        //    the new state; failures drop silently).
        for hash in confirmed {
            self.mempool.remove(&hash);
        }
        let next_height = Height(self.tip.height.0 + 1);
        for tx in readmit {
            if self.state.transaction_location(&tx.hash())?.is_some() {
                continue;
            }
            let _ = self.mempool.insert(tx, &self.state, next_height)?;
        }

        info!(tip = %self.tip.hash(), height = %self.tip.height, "reorganization complete");
        self.notify(&event);
        Ok(Ok(()))
    }

    fn parent_of(&self, meta: &BlockMetadata) -> Result<BlockMetadata, StorageError> {
        self.state
            .metadata(&meta.header.parent_hash)?
            .ok_or(StorageError::Missing("parent metadata for persisted block"))
    }

    fn notify(&mut self, event: &ChainEvent) {
        for listener in &mut self.listeners {
            listener.chain_updated(event);
        }
    }
}

/// The work contributed by a block carrying `bits`.
fn block_work(bits: &CompactDifficulty) -> Work {
    bits.to_expanded()
        .and_then(|target| target.to_work())
        .unwrap_or_else(Work::zero)
}
