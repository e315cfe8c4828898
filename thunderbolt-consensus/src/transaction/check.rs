//! Transaction checks.
//!
//! The context-free rules need nothing but the transaction. The
//! contextual rules resolve inputs through a [`UtxoView`], so they
//! apply equally to the mempool (viewing the live UTXO set) and to
//! block staging (viewing the set through a pending delta).

use std::collections::HashSet;

use thunderbolt_chain::{
    amount::{Amount, NonNegative},
    block::Height,
    parameters::COINBASE_MATURITY,
    transaction::{sighash, Transaction, MAX_TX_SIZE},
    transparent::{self, LockKind, MultiSigUnlock},
    ThunderboltDeserialize,
};
use thunderbolt_state::Utxo;

use crate::chain::UtxoView;
use crate::error::{CheckError, TransactionError};

/// Checks that the transaction has inputs and outputs.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks the serialized size against [`MAX_TX_SIZE`].
pub fn size_is_bounded(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.serialized_size() as u64 > MAX_TX_SIZE {
        Err(TransactionError::OversizeTransaction)
    } else {
        Ok(())
    }
}

/// Sums the output values, which also proves the sum stays inside the
/// money range (each `Amount` is range-checked, and so is the sum).
pub fn output_total(tx: &Transaction) -> Result<Amount<NonNegative>, TransactionError> {
    let mut total = Amount::<NonNegative>::zero();
    for output in &tx.outputs {
        total = (total + output.value)?;
    }
    Ok(total)
}

/// Checks that no two inputs spend the same outpoint. Two coinbase
/// inputs count as duplicates of the null outpoint.
pub fn has_no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::new();
    for input in &tx.inputs {
        // Coinbase inputs all share the null outpoint marker.
        let key = input.outpoint();
        if !seen.insert(key) {
            return Err(TransactionError::DuplicateInput);
        }
    }
    Ok(())
}

/// Checks the coinbase shape rule: a coinbase input may only appear as
/// the sole input of a coinbase transaction. (The bounds on coinbase
/// data are structural and enforced by the deserializer.)
pub fn coinbase_shape(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.contains_coinbase_input() && !tx.is_coinbase() {
        return Err(TransactionError::CoinbaseInputFound);
    }
    Ok(())
}

/// All context-free transaction rules, in rule order.
pub fn context_free(tx: &Transaction) -> Result<(), TransactionError> {
    has_inputs_and_outputs(tx)?;
    output_total(tx)?;
    size_is_bounded(tx)?;
    has_no_duplicate_inputs(tx)?;
    coinbase_shape(tx)?;
    Ok(())
}

/// What a successful contextual check proves about a transaction.
#[derive(Debug)]
pub struct ContextualCheck {
    /// Input value minus output value.
    pub fee: Amount<NonNegative>,
    /// The UTXOs this transaction consumes, in input order. These
    /// become the transaction's slice of the block's revert record.
    pub spent: Vec<Utxo>,
}

/// The contextual rules for a non-coinbase transaction, resolved
/// against `view` as of a block at `spending_height`.
pub fn contextual<V: UtxoView>(
    tx: &Transaction,
    view: &V,
    spending_height: Height,
) -> Result<ContextualCheck, CheckError> {
    let mut input_total = Amount::<NonNegative>::zero();
    let mut spent = Vec::with_capacity(tx.inputs.len());

    for input in &tx.inputs {
        let (outpoint, unlock_script) = match input {
            transparent::Input::PrevOut {
                outpoint,
                unlock_script,
            } => (outpoint, unlock_script),
            transparent::Input::Coinbase { .. } => {
                return Err(TransactionError::CoinbaseOutsideBlock.into())
            }
        };

        let utxo = view
            .utxo(outpoint)
            .map_err(CheckError::Storage)?
            .ok_or(TransactionError::MissingInput(*outpoint))?;

        if utxo.from_coinbase
            && spending_height.0.saturating_sub(utxo.height.0) < COINBASE_MATURITY
        {
            return Err(TransactionError::ImmatureCoinbaseSpend.into());
        }

        check_unlock(outpoint, unlock_script, &utxo.output.lock_script)?;

        input_total = (input_total + utxo.output.value).map_err(TransactionError::from)?;
        spent.push(utxo);
    }

    let output_total = output_total(tx)?;
    let fee =
        (input_total - output_total).map_err(|_| TransactionError::InsufficientInputValue)?;

    Ok(ContextualCheck { fee, spent })
}

/// Rule 8: the unlocking parameters must satisfy the spent output's lock.
pub fn check_unlock(
    outpoint: &transparent::OutPoint,
    unlock_script: &transparent::Script,
    lock: &transparent::LockScript,
) -> Result<(), TransactionError> {
    match lock.kind {
        LockKind::SingleSig => {
            let digest = sighash::signing_digest(outpoint, lock);
            sighash::verify(&digest, &lock.params.0, &unlock_script.0)?;
            Ok(())
        }
        LockKind::MultiSig => {
            let unlock = MultiSigUnlock::thunderbolt_deserialize(unlock_script.0.as_slice())
                .map_err(|_| TransactionError::MalformedUnlock)?;

            if unlock.required == 0 || unlock.required as usize > unlock.keys.len() {
                return Err(TransactionError::MalformedUnlock);
            }
            if unlock.locking_commitment()[..] != lock.params.0[..] {
                return Err(TransactionError::MultisigCommitmentMismatch);
            }

            let digest = sighash::signing_digest(outpoint, lock);
            let mut signers = HashSet::new();
            for keyed in &unlock.signatures {
                let index = keyed.key_index as usize;
                if index >= unlock.keys.len() || !signers.insert(keyed.key_index) {
                    return Err(TransactionError::MalformedUnlock);
                }
                sighash::verify(&digest, &unlock.keys[index].0, &keyed.signature.0)?;
            }

            if signers.len() < unlock.required as usize {
                return Err(TransactionError::InsufficientSignatures);
            }
            Ok(())
        }
        LockKind::Unlockable => Err(TransactionError::UnspendableOutput),
    }
}
