//! Work templates for external miners.
//!
//! The nonce search lives outside the node: this module only assembles
//! everything a miner needs (parent, bits, reward, candidate
//! transactions), and `submitBlock` feeds the result back through the
//! ordinary accept path.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thunderbolt_chain::{
    amount::{Amount, NonNegative},
    block::{self, merkle, Block, Height},
    transaction::Transaction,
    transparent::{CoinbaseData, Input, LockScript, Output},
    work::difficulty::CompactDifficulty,
};
use thunderbolt_state::StorageError;

use crate::chain::ChainEngine;
use crate::parameters::MAX_TEMPLATE_BYTES;
use crate::subsidy;

/// Everything a miner needs to search for the next block.
#[derive(Debug, Clone)]
pub struct WorkTemplate {
    pub height: Height,
    pub timestamp: u64,
    pub bits: CompactDifficulty,
    pub parent_hash: block::Hash,
    /// The coinbase paying the subsidy plus collected fees to the
    /// configured payout lock.
    pub coinbase: Arc<Transaction>,
    /// Fee-ordered candidate transactions, coinbase excluded.
    pub transactions: Vec<Arc<Transaction>>,
}

impl WorkTemplate {
    /// Assemble the block this template describes, with a nonce filled
    /// in. The miner calls this for each candidate nonce (or once,
    /// after searching over the serialized header).
    pub fn build_block(&self, nonce: u64) -> Block {
        let mut transactions = Vec::with_capacity(1 + self.transactions.len());
        transactions.push(self.coinbase.clone());
        transactions.extend(self.transactions.iter().cloned());

        let merkle_root: merkle::Root =
            transactions.iter().map(|tx| tx.hash()).collect();

        let header = block::Header::new(
            1,
            self.parent_hash,
            merkle_root,
            self.timestamp,
            self.bits,
            nonce,
        );

        Block {
            header,
            transactions,
        }
    }
}

impl ChainEngine {
    /// Build a work template on the current tip (`getWork`).
    pub fn work_template(&self, payout: &LockScript) -> Result<WorkTemplate, StorageError> {
        let height = Height(self.tip().height.0 + 1);
        let bits = self.next_bits()?;

        let picks = self.mempool().pick(MAX_TEMPLATE_BYTES, self.state())?;

        let mut fees = Amount::<NonNegative>::zero();
        for (_, fee) in &picks {
            fees = (fees + *fee).expect("total fees stay within the money range");
        }
        let subsidy = subsidy::block_subsidy(height).expect("subsidy is within the money range");
        let reward = (subsidy + fees).expect("the block reward stays within the money range");

        let coinbase = Transaction::new(
            1,
            vec![Input::Coinbase {
                height,
                data: CoinbaseData::new(b"thunderbolt".to_vec())
                    .expect("the miner tag fits in coinbase data"),
            }],
            vec![Output {
                value: reward,
                lock_script: payout.clone(),
            }],
            0,
        );

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        Ok(WorkTemplate {
            height,
            // Never mine behind the parent's clock.
            timestamp: now.max(self.tip().header.timestamp + 1),
            bits,
            parent_hash: self.tip().hash(),
            coinbase: Arc::new(coinbase),
            transactions: picks.into_iter().map(|(tx, _)| tx).collect(),
        })
    }
}
