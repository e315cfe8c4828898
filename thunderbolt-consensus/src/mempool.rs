//! The set of validated transactions waiting for a block.
//!
//! The mempool belongs to the chain engine (the single chain-mutation
//! owner), so nothing here needs interior locking: the engine inserts
//! relayed transactions, removes confirmed ones on connect, and
//! re-inserts unconfirmed ones on disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use thunderbolt_chain::{
    amount::{Amount, NonNegative},
    block::Height,
    transaction::{self, Transaction},
    transparent,
};
use thunderbolt_state::StorageError;

use crate::chain::UtxoView;
use crate::error::{CheckError, TransactionError};
use crate::transaction::check;

/// What happened to a transaction offered to the mempool.
#[derive(Debug)]
pub enum MempoolInsertOutcome {
    /// The transaction was valid and is now pending.
    Added,
    /// The transaction is already pending; not an error, not a ban.
    AlreadyKnown,
    /// The transaction broke a rule; its sender earns ban score.
    Invalid(TransactionError),
}

#[derive(Debug, Clone)]
struct Entry {
    tx: Arc<Transaction>,
    fee: Amount<NonNegative>,
    size: usize,
    /// Insertion order, the fee-tie breaker in [`Mempool::pick`].
    sequence: u64,
}

/// The pending transaction set.
#[derive(Debug)]
pub struct Mempool {
    entries: HashMap<transaction::Hash, Entry>,
    /// Outpoints spent by pending transactions, for double-spend
    /// rejection ahead of the UTXO view (which still contains them).
    spent_outpoints: HashMap<transparent::OutPoint, transaction::Hash>,
    next_sequence: u64,
    size_bytes: usize,
    last_updated: u64,
    /// The relay fee floor in atomic units per 1000 bytes; 0 disables.
    min_fee_per_kb: u64,
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl Mempool {
    pub fn new(min_fee_per_kb: u64) -> Mempool {
        Mempool {
            entries: HashMap::new(),
            spent_outpoints: HashMap::new(),
            next_sequence: 0,
            size_bytes: 0,
            last_updated: now_seconds(),
            min_fee_per_kb,
        }
    }

    /// Offer a transaction, validating it against `view` as of a block
    /// at `next_height` (the height it could first be mined at).
    pub fn insert<V: UtxoView>(
        &mut self,
        tx: Arc<Transaction>,
        view: &V,
        next_height: Height,
    ) -> Result<MempoolInsertOutcome, StorageError> {
        let hash = tx.hash();

        if self.entries.contains_key(&hash) {
            return Ok(MempoolInsertOutcome::AlreadyKnown);
        }

        if let Err(e) = check::context_free(&tx) {
            return Ok(MempoolInsertOutcome::Invalid(e));
        }
        if tx.is_coinbase() {
            return Ok(MempoolInsertOutcome::Invalid(
                TransactionError::CoinbaseOutsideBlock,
            ));
        }

        // A pending transaction already claims the output: the UTXO
        // view still contains it, so rule 6 alone would admit a double
        // spend.
        for input in &tx.inputs {
            if let Some(outpoint) = input.outpoint() {
                if self.spent_outpoints.contains_key(&outpoint) {
                    return Ok(MempoolInsertOutcome::Invalid(
                        TransactionError::MissingInput(outpoint),
                    ));
                }
            }
        }

        let checked = match check::contextual(&tx, view, next_height) {
            Ok(checked) => checked,
            Err(CheckError::Storage(e)) => return Err(e),
            Err(CheckError::Invalid(e)) => return Ok(MempoolInsertOutcome::Invalid(e)),
        };

        let size = tx.serialized_size();
        if self.min_fee_per_kb > 0 {
            let floor = (size as u64).saturating_mul(self.min_fee_per_kb) / 1000;
            if (checked.fee.atoms() as u64) < floor {
                return Ok(MempoolInsertOutcome::Invalid(
                    TransactionError::FeeBelowMinimum,
                ));
            }
        }

        for input in &tx.inputs {
            if let Some(outpoint) = input.outpoint() {
                self.spent_outpoints.insert(outpoint, hash);
            }
        }
        self.size_bytes += size;
        self.entries.insert(
            hash,
            Entry {
                tx,
                fee: checked.fee,
                size,
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
        self.last_updated = now_seconds();

        trace!(%hash, "transaction entered mempool");
        Ok(MempoolInsertOutcome::Added)
    }

    /// Remove a pending transaction. Returns whether it was present.
    pub fn remove(&mut self, hash: &transaction::Hash) -> bool {
        match self.entries.remove(hash) {
            Some(entry) => {
                for input in &entry.tx.inputs {
                    if let Some(outpoint) = input.outpoint() {
                        self.spent_outpoints.remove(&outpoint);
                    }
                }
                self.size_bytes -= entry.size;
                self.last_updated = now_seconds();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<Arc<Transaction>> {
        self.entries.get(hash).map(|entry| entry.tx.clone())
    }

    /// The ids of every pending transaction, for `mempool` inventory
    /// replies. Unordered.
    pub fn transaction_hashes(&self) -> Vec<transaction::Hash> {
        self.entries.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// When the pool last changed, as Unix seconds.
    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    /// Select transactions for a block template: fee-descending, ties
    /// broken by insertion order, skipping anything whose inputs are no
    /// longer spendable in `view`, until `max_bytes` of serialized
    /// transactions are selected.
    pub fn pick<V: UtxoView>(
        &self,
        max_bytes: usize,
        view: &V,
    ) -> Result<Vec<(Arc<Transaction>, Amount<NonNegative>)>, StorageError> {
        let mut candidates: Vec<&Entry> = self.entries.values().collect();
        candidates.sort_by(|a, b| {
            b.fee
                .cmp(&a.fee)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });

        let mut selected = Vec::new();
        let mut total = 0usize;

        'candidates: for entry in candidates {
            if total + entry.size > max_bytes {
                continue;
            }
            for input in &entry.tx.inputs {
                let outpoint = match input.outpoint() {
                    Some(outpoint) => outpoint,
                    None => continue 'candidates,
                };
                if view.utxo(&outpoint)?.is_none() {
                    continue 'candidates;
                }
            }
            total += entry.size;
            selected.push((entry.tx.clone(), entry.fee));
        }

        Ok(selected)
    }
}
