//! Consensus check functions for whole blocks.

use thunderbolt_chain::{
    amount::{Amount, NonNegative},
    block::{Block, Header, Height, MAX_BLOCK_BYTES},
    parameters::Network,
    transaction,
};

use crate::error::*;
use crate::subsidy;
use crate::transaction::check as tx_check;

/// Returns `Ok(())` if the block carries at least one transaction.
pub fn has_transactions(block: &Block) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        Err(BlockError::NoTransactions)
    } else {
        Ok(())
    }
}

/// Returns `Ok(())` if there is exactly one coinbase transaction in the
/// block, and that coinbase transaction is the first transaction.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition)?;
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound)?;
    }

    Ok(())
}

/// Returns `Ok(())` if the serialized block fits in [`MAX_BLOCK_BYTES`].
pub fn size_is_bounded(block: &Block) -> Result<(), BlockError> {
    if block.serialized_size() as u64 > MAX_BLOCK_BYTES {
        Err(BlockError::OversizeBlock)
    } else {
        Ok(())
    }
}

/// Returns `Ok(())` if `hash` passes:
///   - the target difficulty limit for `network`, and
///   - the difficulty filter (the proof of work itself),
/// based on the `bits` field in `header`.
///
/// The comparisons here are u256 integer comparisons: greater values
/// represent *less* work.
pub fn difficulty_is_valid(
    header: &Header,
    network: Network,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .bits
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(header.bits))?;

    let pow_limit = network
        .pow_limit()
        .to_expanded()
        .expect("the pow limit is a valid difficulty encoding");

    // The limit check doesn't depend on any previous blocks.
    if difficulty_threshold > pow_limit {
        return Err(BlockError::TargetDifficultyLimit(header.bits));
    }

    // The difficulty filter: hash exactly equal to the target is valid,
    // one greater is not.
    let hash = header.hash();
    if hash > difficulty_threshold {
        return Err(BlockError::DifficultyFilter(hash));
    }

    Ok(())
}

/// Check merkle root validity.
///
/// `transaction_hashes` is a precomputed list of the block's
/// transaction hashes, in block order.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // Merkle trees with duplicated leaves are malleable: a block with a
    // repeated transaction can share a root with an honest one. Reject
    // duplicate transaction hashes outright.
    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// All the rules a block can break without any chain context: shape,
/// per-transaction context-free rules, the merkle commitment, and its
/// own proof of work. Whether `bits` follows the retarget schedule is a
/// separate, contextual question.
pub fn context_free(block: &Block, network: Network) -> Result<(), BlockError> {
    has_transactions(block)?;
    coinbase_is_first(block)?;
    size_is_bounded(block)?;

    for tx in &block.transactions {
        tx_check::context_free(tx)?;
    }

    let hashes: Vec<transaction::Hash> =
        block.transactions.iter().map(|tx| tx.hash()).collect();
    merkle_root_validity(block, &hashes)?;

    difficulty_is_valid(&block.header, network)?;

    Ok(())
}

/// Returns `Ok(())` if the coinbase value is within the block subsidy
/// plus the fees collected from the block's other transactions.
pub fn subsidy_is_valid(
    block: &Block,
    height: Height,
    fees: Amount<NonNegative>,
) -> Result<(), BlockError> {
    let coinbase = block
        .transactions
        .get(0)
        .ok_or(BlockError::Transaction(TransactionError::Subsidy(
            SubsidyError::NoCoinbase,
        )))?;

    let claimed = tx_check::output_total(coinbase).map_err(BlockError::Transaction)?;
    let allowed = (subsidy::block_subsidy(height).map_err(TransactionError::from)? + fees)
        .map_err(TransactionError::from)?;

    if claimed > allowed {
        return Err(TransactionError::Subsidy(SubsidyError::ExcessiveCoinbaseValue).into());
    }

    Ok(())
}
